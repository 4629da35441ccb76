//! Shader node instances.
//!
//! A node is its kind, the current values of its input sockets, and a
//! kind-specific [`NodeSettings`] variant holding the members that are not
//! sockets (blend modes, image data, texture mappings...). The name-keyed
//! setters used at the boundary are routed into an exhaustive match over the
//! settings variant, so a member that a kind does not have can never be
//! written.

use glam::{Mat4, Vec3, Vec4};

use super::kind::ShaderNodeKind;
use super::socket::{InputSocket, SocketType, SocketValue};
use crate::error::{HostError, HostResult};

/// Blend mode of a Mix node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum MixBlend {
    #[default]
    Mix = 0,
    Add,
    Multiply,
    Screen,
    Overlay,
    Subtract,
    Divide,
    Difference,
    Darken,
    Lighten,
    Dodge,
    Burn,
    Hue,
    Saturation,
    Value,
    Color,
    SoftLight,
    LinearLight,
}

impl MixBlend {
    const ALL: [MixBlend; 18] = [
        Self::Mix,
        Self::Add,
        Self::Multiply,
        Self::Screen,
        Self::Overlay,
        Self::Subtract,
        Self::Divide,
        Self::Difference,
        Self::Darken,
        Self::Lighten,
        Self::Dodge,
        Self::Burn,
        Self::Hue,
        Self::Saturation,
        Self::Value,
        Self::Color,
        Self::SoftLight,
        Self::LinearLight,
    ];
}

/// Operation of a Math node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum MathOp {
    #[default]
    Add = 0,
    Subtract,
    Multiply,
    Divide,
    Sine,
    Cosine,
    Tangent,
    Arcsine,
    Arccosine,
    Arctangent,
    Power,
    Logarithm,
    Minimum,
    Maximum,
    Round,
    LessThan,
    GreaterThan,
    Modulo,
    Absolute,
}

impl MathOp {
    const ALL: [MathOp; 19] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Sine,
        Self::Cosine,
        Self::Tangent,
        Self::Arcsine,
        Self::Arccosine,
        Self::Arctangent,
        Self::Power,
        Self::Logarithm,
        Self::Minimum,
        Self::Maximum,
        Self::Round,
        Self::LessThan,
        Self::GreaterThan,
        Self::Modulo,
        Self::Absolute,
    ];
}

/// Operation of a vector math node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum VectorMathOp {
    #[default]
    Add = 0,
    Subtract,
    Average,
    DotProduct,
    CrossProduct,
    Normalize,
}

impl VectorMathOp {
    const ALL: [VectorMathOp; 6] = [
        Self::Add,
        Self::Subtract,
        Self::Average,
        Self::DotProduct,
        Self::CrossProduct,
        Self::Normalize,
    ];
}

/// Microfacet distribution of glossy-type closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Distribution {
    Sharp = 0,
    Beckmann,
    #[default]
    Ggx,
    AshikhminShirley,
    MultiscatterGgx,
}

impl Distribution {
    const ALL: [Distribution; 5] = [
        Self::Sharp,
        Self::Beckmann,
        Self::Ggx,
        Self::AshikhminShirley,
        Self::MultiscatterGgx,
    ];
}

/// Subsurface falloff profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum SubsurfaceFalloff {
    Cubic = 0,
    Gaussian,
    #[default]
    Burley,
    RandomWalk,
}

impl SubsurfaceFalloff {
    const ALL: [SubsurfaceFalloff; 4] = [
        Self::Cubic,
        Self::Gaussian,
        Self::Burley,
        Self::RandomWalk,
    ];
}

fn pick<T: Copy>(table: &[T], raw: i32, kind: ShaderNodeKind, name: &str) -> HostResult<T> {
    usize::try_from(raw)
        .ok()
        .and_then(|i| table.get(i).copied())
        .ok_or_else(|| HostError::argument(format!("{raw} is not a valid {name} for {kind:?}")))
}

/// Per-axis remapping of a texture mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MappingAxis {
    None = 0,
    #[default]
    X,
    Y,
    Z,
}

impl MappingAxis {
    pub fn from_raw(raw: u32) -> HostResult<Self> {
        [Self::None, Self::X, Self::Y, Self::Z]
            .get(raw as usize)
            .copied()
            .ok_or_else(|| HostError::argument(format!("{raw} is not a mapping axis")))
    }
}

/// Projection of a texture mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MappingProjection {
    #[default]
    Flat = 0,
    Cube,
    Tube,
    Sphere,
}

impl MappingProjection {
    pub fn from_raw(raw: u32) -> HostResult<Self> {
        [Self::Flat, Self::Cube, Self::Tube, Self::Sphere]
            .get(raw as usize)
            .copied()
            .ok_or_else(|| HostError::argument(format!("{raw} is not a mapping projection")))
    }
}

/// How a texture mapping transform is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MappingType {
    #[default]
    Point = 0,
    Texture,
    Vector,
    Normal,
}

impl MappingType {
    pub fn from_raw(raw: u32) -> HostResult<Self> {
        [Self::Point, Self::Texture, Self::Vector, Self::Normal]
            .get(raw as usize)
            .copied()
            .ok_or_else(|| HostError::argument(format!("{raw} is not a mapping type")))
    }
}

/// Component of a texture mapping set by
/// [`ShaderNode::set_mapping_transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MappingComponent {
    Translation = 0,
    Rotation = 1,
    Scale = 2,
    Min = 3,
    Max = 4,
}

impl MappingComponent {
    pub fn from_raw(raw: i32) -> HostResult<Self> {
        match raw {
            0 => Ok(Self::Translation),
            1 => Ok(Self::Rotation),
            2 => Ok(Self::Scale),
            3 => Ok(Self::Min),
            4 => Ok(Self::Max),
            _ => Err(HostError::argument(format!("{raw} is not a mapping component"))),
        }
    }
}

/// Texture coordinate transform carried by texture nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureMapping {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub min: Vec3,
    pub max: Vec3,
    pub use_minmax: bool,
    pub axes: [MappingAxis; 3],
    pub projection: MappingProjection,
    pub mapping_type: MappingType,
}

impl Default for TextureMapping {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            min: Vec3::splat(f32::MIN),
            max: Vec3::splat(f32::MAX),
            use_minmax: false,
            axes: [MappingAxis::X, MappingAxis::Y, MappingAxis::Z],
            projection: MappingProjection::Flat,
            mapping_type: MappingType::Point,
        }
    }
}

/// Pixels handed to an image node by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    Float(Vec<f32>),
    Byte(Vec<u8>),
}

/// In-memory image attached to an image or environment texture.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub channels: u32,
    pub pixels: ImagePixels,
}

impl ImageData {
    /// Wraps `pixels`, checking the length against the dimensions.
    pub fn new(
        name: impl Into<String>,
        pixels: ImagePixels,
        [width, height, depth, channels]: [u32; 4],
    ) -> HostResult<Self> {
        let expected = width as usize * height as usize * depth.max(1) as usize * channels as usize;
        let actual = match &pixels {
            ImagePixels::Float(p) => p.len(),
            ImagePixels::Byte(p) => p.len(),
        };
        if expected == 0 || actual != expected {
            return Err(HostError::argument(format!(
                "image of {width}x{height}x{depth}x{channels} needs {expected} values, got {actual}"
            )));
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            depth,
            channels,
            pixels,
        })
    }
}

/// Members of image-backed texture nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageSettings {
    pub filename: String,
    pub color_space: i32,
    pub interpolation: i32,
    pub extension: i32,
    pub projection: i32,
    pub projection_blend: f32,
    pub use_alpha: bool,
    pub is_linear: bool,
    pub image: Option<ImageData>,
    pub mapping: TextureMapping,
}

/// Kind-specific members of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSettings {
    /// Kinds whose state is entirely in their sockets.
    Plain,
    Value { value: f32 },
    Color { value: Vec3 },
    Mix { blend: MixBlend, use_clamp: bool },
    Math { op: MathOp, use_clamp: bool },
    VectorMath { op: VectorMathOp },
    Microfacet { distribution: Distribution },
    Toon { component: i32 },
    Hair { component: i32 },
    Subsurface { falloff: SubsurfaceFalloff },
    Principled {
        distribution: Distribution,
        subsurface_method: SubsurfaceFalloff,
    },
    Image(Box<ImageSettings>),
    Brick {
        mapping: TextureMapping,
        offset: f32,
        offset_frequency: i32,
        squash: f32,
        squash_frequency: i32,
    },
    Sky {
        mapping: TextureMapping,
        sky_type: i32,
        sun_direction: Vec3,
        turbidity: f32,
        ground_albedo: f32,
    },
    Magic { mapping: TextureMapping, depth: i32 },
    /// Procedural textures with one style selector (`type` or `coloring`).
    Procedural { mapping: TextureMapping, style: i32 },
    Mapping { mapping: TextureMapping },
    TextureCoordinate { from_dupli: bool, use_transform: bool },
    Bump { invert: bool },
    ColorRamp { ramp: Vec<Vec4>, interpolate: bool },
    MatrixMath { transform: Mat4 },
    Attribute { attribute: String },
    NormalMap { space: i32, attribute: String },
    Tangent { direction_type: i32, axis: i32, attribute: String },
    Wireframe { use_pixel_size: bool },
}

impl NodeSettings {
    /// Default members for `kind`.
    pub fn for_kind(kind: ShaderNodeKind) -> Self {
        use ShaderNodeKind as K;
        let mapping = TextureMapping::default();
        match kind {
            K::Value => Self::Value { value: 0.0 },
            K::Color => Self::Color { value: Vec3::ZERO },
            K::Mix => Self::Mix {
                blend: MixBlend::Mix,
                use_clamp: false,
            },
            K::Math => Self::Math {
                op: MathOp::Add,
                use_clamp: false,
            },
            K::VectMath => Self::VectorMath {
                op: VectorMathOp::Add,
            },
            K::Anisotropic | K::Glossy | K::Glass | K::Refraction => Self::Microfacet {
                distribution: Distribution::Ggx,
            },
            K::Toon => Self::Toon { component: 0 },
            K::Hair => Self::Hair { component: 0 },
            K::SubsurfaceScattering => Self::Subsurface {
                falloff: SubsurfaceFalloff::Burley,
            },
            K::PrincipledBsdf => Self::Principled {
                distribution: Distribution::MultiscatterGgx,
                subsurface_method: SubsurfaceFalloff::Burley,
            },
            K::ImageTexture | K::EnvironmentTexture => Self::Image(Box::default()),
            K::BrickTexture => Self::Brick {
                mapping,
                offset: 0.5,
                offset_frequency: 2,
                squash: 1.0,
                squash_frequency: 2,
            },
            K::SkyTexture => Self::Sky {
                mapping,
                sky_type: 0,
                sun_direction: Vec3::Z,
                turbidity: 2.2,
                ground_albedo: 0.3,
            },
            K::MagicTexture => Self::Magic { mapping, depth: 2 },
            K::CheckerTexture
            | K::NoiseTexture
            | K::WaveTexture
            | K::MusgraveTexture
            | K::VoronoiTexture
            | K::GradientTexture => Self::Procedural { mapping, style: 0 },
            K::Mapping => Self::Mapping { mapping },
            K::TextureCoordinate => Self::TextureCoordinate {
                from_dupli: false,
                use_transform: false,
            },
            K::Bump => Self::Bump { invert: false },
            K::ColorRamp => Self::ColorRamp {
                ramp: Vec::new(),
                interpolate: true,
            },
            K::MatrixMath => Self::MatrixMath {
                transform: Mat4::IDENTITY,
            },
            K::Attribute => Self::Attribute {
                attribute: String::new(),
            },
            K::NormalMap => Self::NormalMap {
                space: 0,
                attribute: String::new(),
            },
            K::Tangent => Self::Tangent {
                direction_type: 0,
                axis: 0,
                attribute: String::new(),
            },
            K::Wireframe => Self::Wireframe {
                use_pixel_size: false,
            },
            K::Background
            | K::Output
            | K::Diffuse
            | K::Translucent
            | K::Transparent
            | K::Velvet
            | K::Emission
            | K::AmbientOcclusion
            | K::AbsorptionVolume
            | K::ScatterVolume
            | K::MixClosure
            | K::AddClosure
            | K::Invert
            | K::Gamma
            | K::Wavelength
            | K::Blackbody
            | K::Camera
            | K::Fresnel
            | K::RgbToBw
            | K::RgbToLuminance
            | K::LightPath
            | K::LightFalloff
            | K::LayerWeight
            | K::GeometryInfo
            | K::CombineXyz
            | K::SeparateXyz
            | K::HsvSeparate
            | K::HsvCombine
            | K::RgbSeparate
            | K::RgbCombine
            | K::Holdout
            | K::HueSat
            | K::BrightContrast
            | K::ObjectInfo
            | K::Displacement => Self::Plain,
        }
    }

    /// The texture mapping block, for kinds that carry one.
    pub fn mapping_mut(&mut self) -> Option<&mut TextureMapping> {
        match self {
            Self::Image(image) => Some(&mut image.mapping),
            Self::Brick { mapping, .. }
            | Self::Sky { mapping, .. }
            | Self::Magic { mapping, .. }
            | Self::Procedural { mapping, .. }
            | Self::Mapping { mapping } => Some(mapping),
            _ => None,
        }
    }

    pub fn mapping(&self) -> Option<&TextureMapping> {
        match self {
            Self::Image(image) => Some(&image.mapping),
            Self::Brick { mapping, .. }
            | Self::Sky { mapping, .. }
            | Self::Magic { mapping, .. }
            | Self::Procedural { mapping, .. }
            | Self::Mapping { mapping } => Some(mapping),
            _ => None,
        }
    }
}

fn unknown(kind: ShaderNodeKind, name: &str, value_type: &'static str) -> HostError {
    HostError::UnknownAttribute {
        kind,
        name: name.to_string(),
        value_type,
    }
}

/// One node of a shader graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderNode {
    id: u32,
    kind: ShaderNodeKind,
    inputs: Vec<InputSocket>,
    settings: NodeSettings,
}

impl ShaderNode {
    pub fn new(id: u32, kind: ShaderNodeKind) -> Self {
        Self {
            id,
            kind,
            inputs: kind.inputs().iter().copied().map(InputSocket::new).collect(),
            settings: NodeSettings::for_kind(kind),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> ShaderNodeKind {
        self.kind
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn inputs(&self) -> &[InputSocket] {
        &self.inputs
    }

    /// Current value of input socket `name`.
    pub fn input_value(&self, name: &str) -> Option<&SocketValue> {
        self.inputs
            .iter()
            .find(|socket| socket.spec.name == name)
            .map(|socket| &socket.value)
    }

    /// Fails with [`HostError::TypeMismatch`] unless this node is `expected`.
    pub fn expect_kind(&self, setter: &'static str, expected: ShaderNodeKind) -> HostResult<()> {
        if self.kind != expected {
            return Err(HostError::TypeMismatch {
                setter,
                node: self.id,
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }

    fn input_mut(&mut self, name: &str, value_type: &'static str) -> HostResult<&mut InputSocket> {
        let kind = self.kind;
        self.inputs
            .iter_mut()
            .find(|socket| socket.spec.name == name)
            .ok_or_else(|| unknown(kind, name, value_type))
    }

    // Socket attributes.

    /// Sets the default value of a float (or int) input socket.
    pub fn set_attribute_float(&mut self, name: &str, value: f32) -> HostResult<()> {
        let kind = self.kind;
        let socket = self.input_mut(name, "float")?;
        socket.value = match socket.spec.ty {
            SocketType::Float => SocketValue::Float(value),
            SocketType::Int => SocketValue::Int(value as i32),
            _ => return Err(unknown(kind, name, "float")),
        };
        Ok(())
    }

    /// Sets the default value of an int (or float) input socket.
    pub fn set_attribute_int(&mut self, name: &str, value: i32) -> HostResult<()> {
        let kind = self.kind;
        let socket = self.input_mut(name, "int")?;
        socket.value = match socket.spec.ty {
            SocketType::Int => SocketValue::Int(value),
            SocketType::Float => SocketValue::Float(value as f32),
            _ => return Err(unknown(kind, name, "int")),
        };
        Ok(())
    }

    /// Sets the default value of a color or vector input socket.
    pub fn set_attribute_vec(&mut self, name: &str, value: Vec3) -> HostResult<()> {
        let kind = self.kind;
        let socket = self.input_mut(name, "vector")?;
        socket.value = match socket.spec.ty {
            SocketType::Color => SocketValue::Color(value),
            SocketType::Vector => SocketValue::Vector(value),
            _ => return Err(unknown(kind, name, "vector")),
        };
        Ok(())
    }

    /// Sets the default value of a string input socket.
    pub fn set_attribute_string(&mut self, name: &str, value: &str) -> HostResult<()> {
        let kind = self.kind;
        let socket = self.input_mut(name, "string")?;
        if socket.spec.ty != SocketType::String {
            return Err(unknown(kind, name, "string"));
        }
        socket.value = SocketValue::String(value.to_string());
        Ok(())
    }

    // Kind-checked members.

    /// Sets enum member `name` to the raw value `value`.
    pub fn set_enum(&mut self, kind: ShaderNodeKind, name: &str, value: i32) -> HostResult<()> {
        self.expect_kind("set_enum", kind)?;
        let kind = self.kind;
        match (&mut self.settings, name) {
            (NodeSettings::Mix { blend, .. }, "type") => {
                *blend = pick(&MixBlend::ALL, value, kind, name)?
            }
            (NodeSettings::Math { op, .. }, "type") => *op = pick(&MathOp::ALL, value, kind, name)?,
            (NodeSettings::VectorMath { op }, "type") => {
                *op = pick(&VectorMathOp::ALL, value, kind, name)?
            }
            (NodeSettings::Microfacet { distribution }, "distribution")
            | (NodeSettings::Principled { distribution, .. }, "distribution") => {
                *distribution = pick(&Distribution::ALL, value, kind, name)?
            }
            (NodeSettings::Principled {
                subsurface_method, ..
            }, "subsurface_method")
            | (NodeSettings::Subsurface {
                falloff: subsurface_method,
            }, "falloff") => {
                *subsurface_method = pick(&SubsurfaceFalloff::ALL, value, kind, name)?
            }
            (NodeSettings::Toon { component }, "component")
            | (NodeSettings::Hair { component }, "component") => *component = value,
            (NodeSettings::Image(image), "color_space") => image.color_space = value,
            (NodeSettings::Image(image), "interpolation") => image.interpolation = value,
            (NodeSettings::Image(image), "extension") => image.extension = value,
            (NodeSettings::Image(image), "projection") => image.projection = value,
            (NodeSettings::Sky { sky_type, .. }, "type") => *sky_type = value,
            (NodeSettings::Procedural { style, .. }, "type" | "coloring") => *style = value,
            (NodeSettings::NormalMap { space, .. }, "space") => *space = value,
            (NodeSettings::Tangent { direction_type, .. }, "direction_type") => {
                *direction_type = value
            }
            (NodeSettings::Tangent { axis, .. }, "axis") => *axis = value,
            _ => return Err(unknown(kind, name, "enum")),
        }
        Ok(())
    }

    pub fn set_member_bool(&mut self, kind: ShaderNodeKind, name: &str, value: bool) -> HostResult<()> {
        self.expect_kind("set_member_bool", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::Mix { use_clamp, .. }, "use_clamp")
            | (NodeSettings::Math { use_clamp, .. }, "use_clamp") => *use_clamp = value,
            (NodeSettings::Image(image), "use_alpha") => image.use_alpha = value,
            (NodeSettings::Image(image), "is_linear") => image.is_linear = value,
            (NodeSettings::TextureCoordinate { from_dupli, .. }, "from_dupli") => *from_dupli = value,
            (NodeSettings::TextureCoordinate { use_transform, .. }, "use_transform") => {
                *use_transform = value
            }
            (NodeSettings::Bump { invert }, "invert") => *invert = value,
            (NodeSettings::ColorRamp { interpolate, .. }, "interpolate") => *interpolate = value,
            (NodeSettings::Wireframe { use_pixel_size }, "use_pixel_size") => *use_pixel_size = value,
            (settings, "use_minmax") => match settings.mapping_mut() {
                Some(mapping) => mapping.use_minmax = value,
                None => return Err(unknown(kind, name, "bool")),
            },
            _ => return Err(unknown(kind, name, "bool")),
        }
        Ok(())
    }

    pub fn set_member_int(&mut self, kind: ShaderNodeKind, name: &str, value: i32) -> HostResult<()> {
        self.expect_kind("set_member_int", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::Image(image), "interpolation") => image.interpolation = value,
            (NodeSettings::Image(image), "extension") => image.extension = value,
            (NodeSettings::Brick { offset_frequency, .. }, "offset_frequency") => {
                *offset_frequency = value
            }
            (NodeSettings::Brick { squash_frequency, .. }, "squash_frequency") => {
                *squash_frequency = value
            }
            (NodeSettings::Magic { depth, .. }, "depth") => *depth = value,
            _ => return Err(unknown(kind, name, "int")),
        }
        Ok(())
    }

    pub fn set_member_float(&mut self, kind: ShaderNodeKind, name: &str, value: f32) -> HostResult<()> {
        self.expect_kind("set_member_float", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::Value { value: v }, "value") => *v = value,
            (NodeSettings::Image(image), "projection_blend") => image.projection_blend = value,
            (NodeSettings::Brick { offset, .. }, "offset") => *offset = value,
            (NodeSettings::Brick { squash, .. }, "squash") => *squash = value,
            (NodeSettings::Sky { turbidity, .. }, "turbidity") => *turbidity = value,
            (NodeSettings::Sky { ground_albedo, .. }, "ground_albedo") => *ground_albedo = value,
            _ => return Err(unknown(kind, name, "float")),
        }
        Ok(())
    }

    pub fn set_member_vec(&mut self, kind: ShaderNodeKind, name: &str, value: Vec3) -> HostResult<()> {
        self.expect_kind("set_member_vec", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::Color { value: v }, "value") => *v = value,
            (NodeSettings::Sky { sun_direction, .. }, "sun_direction") => *sun_direction = value,
            _ => return Err(unknown(kind, name, "vector")),
        }
        Ok(())
    }

    pub fn set_member_string(&mut self, kind: ShaderNodeKind, name: &str, value: &str) -> HostResult<()> {
        self.expect_kind("set_member_string", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::Image(image), "filename") => image.filename = value.to_string(),
            (NodeSettings::Attribute { attribute }, "attribute")
            | (NodeSettings::NormalMap { attribute, .. }, "attribute")
            | (NodeSettings::Tangent { attribute, .. }, "attribute") => {
                *attribute = value.to_string()
            }
            _ => return Err(unknown(kind, name, "string")),
        }
        Ok(())
    }

    /// Writes `value` at `index` of an indexed vec4 member, growing the
    /// member as needed.
    pub fn set_member_vec4_at_index(
        &mut self,
        kind: ShaderNodeKind,
        name: &str,
        value: Vec4,
        index: usize,
    ) -> HostResult<()> {
        self.expect_kind("set_member_vec4_at_index", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::ColorRamp { ramp, .. }, "ramp") => {
                if ramp.len() <= index {
                    ramp.resize(index + 1, Vec4::ZERO);
                }
                ramp[index] = value;
            }
            (NodeSettings::MatrixMath { transform }, "tfm") => {
                if index > 3 {
                    return Err(HostError::argument(format!(
                        "matrix row {index} is out of range"
                    )));
                }
                *transform = transform.transpose();
                *transform.col_mut(index) = value;
                *transform = transform.transpose();
            }
            _ => return Err(unknown(kind, name, "vec4")),
        }
        Ok(())
    }

    /// Attaches caller-supplied pixels to an image node.
    pub fn set_member_image(&mut self, kind: ShaderNodeKind, name: &str, image: ImageData) -> HostResult<()> {
        self.expect_kind("set_member_image", kind)?;
        match (&mut self.settings, name) {
            (NodeSettings::Image(settings), "builtin-data") => {
                settings.filename = image.name.clone();
                settings.image = Some(image);
            }
            _ => return Err(unknown(kind, name, "image")),
        }
        Ok(())
    }

    // Texture mapping.

    fn texture_mapping(&mut self, setter: &'static str, kind: ShaderNodeKind) -> HostResult<&mut TextureMapping> {
        self.expect_kind(setter, kind)?;
        let node_kind = self.kind;
        self.settings
            .mapping_mut()
            .ok_or_else(|| HostError::UnknownAttribute {
                kind: node_kind,
                name: "tex_mapping".to_string(),
                value_type: "mapping",
            })
    }

    pub fn set_mapping_transform(
        &mut self,
        kind: ShaderNodeKind,
        component: MappingComponent,
        value: Vec3,
    ) -> HostResult<()> {
        let mapping = self.texture_mapping("texmapping_set_transformation", kind)?;
        match component {
            MappingComponent::Translation => mapping.translation = value,
            MappingComponent::Rotation => mapping.rotation = value,
            MappingComponent::Scale => mapping.scale = value,
            MappingComponent::Min => mapping.min = value,
            MappingComponent::Max => mapping.max = value,
        }
        Ok(())
    }

    pub fn set_mapping_axes(&mut self, kind: ShaderNodeKind, axes: [MappingAxis; 3]) -> HostResult<()> {
        self.texture_mapping("texmapping_set_mapping", kind)?.axes = axes;
        Ok(())
    }

    pub fn set_mapping_projection(
        &mut self,
        kind: ShaderNodeKind,
        projection: MappingProjection,
    ) -> HostResult<()> {
        self.texture_mapping("texmapping_set_projection", kind)?.projection = projection;
        Ok(())
    }

    pub fn set_mapping_type(&mut self, kind: ShaderNodeKind, mapping_type: MappingType) -> HostResult<()> {
        self.texture_mapping("texmapping_set_type", kind)?.mapping_type = mapping_type;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_setter_checks_kind() {
        let mut node = ShaderNode::new(3, ShaderNodeKind::Math);
        let before = node.clone();

        let err = node
            .set_enum(ShaderNodeKind::Mix, "type", 2)
            .unwrap_err();
        assert_eq!(
            err,
            HostError::TypeMismatch {
                setter: "set_enum",
                node: 3,
                expected: ShaderNodeKind::Mix,
                actual: ShaderNodeKind::Math,
            }
        );
        assert_eq!(node, before);

        node.set_enum(ShaderNodeKind::Math, "type", 2).unwrap();
        assert_eq!(
            node.settings(),
            &NodeSettings::Math {
                op: MathOp::Multiply,
                use_clamp: false
            }
        );
    }

    #[test]
    fn test_unknown_member_is_rejected() {
        let mut node = ShaderNode::new(0, ShaderNodeKind::Mix);
        assert!(matches!(
            node.set_member_float(ShaderNodeKind::Mix, "use_clamp", 1.0),
            Err(HostError::UnknownAttribute { .. })
        ));
        node.set_member_bool(ShaderNodeKind::Mix, "use_clamp", true).unwrap();
        assert_eq!(
            node.settings(),
            &NodeSettings::Mix {
                blend: MixBlend::Mix,
                use_clamp: true
            }
        );
    }

    #[test]
    fn test_out_of_range_enum_value() {
        let mut node = ShaderNode::new(0, ShaderNodeKind::Mix);
        assert!(node.set_enum(ShaderNodeKind::Mix, "type", 18).is_err());
        assert!(node.set_enum(ShaderNodeKind::Mix, "type", -1).is_err());
        node.set_enum(ShaderNodeKind::Mix, "type", 17).unwrap();
    }

    #[test]
    fn test_socket_attributes() {
        let mut node = ShaderNode::new(0, ShaderNodeKind::Diffuse);
        node.set_attribute_vec("Color", Vec3::new(1.0, 0.0, 0.0)).unwrap();
        node.set_attribute_int("Roughness", 1).unwrap();
        assert_eq!(
            node.input_value("Color"),
            Some(&SocketValue::Color(Vec3::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(node.input_value("Roughness"), Some(&SocketValue::Float(1.0)));
        assert!(node.set_attribute_float("Color", 1.0).is_err());
        assert!(node.set_attribute_float("Missing", 1.0).is_err());
    }

    #[test]
    fn test_texture_mapping_only_on_texture_kinds() {
        let mut noise = ShaderNode::new(1, ShaderNodeKind::NoiseTexture);
        noise
            .set_mapping_transform(
                ShaderNodeKind::NoiseTexture,
                MappingComponent::Scale,
                Vec3::splat(2.0),
            )
            .unwrap();
        assert_eq!(noise.settings().mapping().unwrap().scale, Vec3::splat(2.0));

        let mut diffuse = ShaderNode::new(2, ShaderNodeKind::Diffuse);
        assert!(matches!(
            diffuse.set_mapping_projection(ShaderNodeKind::Diffuse, MappingProjection::Cube),
            Err(HostError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_color_ramp_grows() {
        let mut node = ShaderNode::new(0, ShaderNodeKind::ColorRamp);
        node.set_member_vec4_at_index(ShaderNodeKind::ColorRamp, "ramp", Vec4::ONE, 2)
            .unwrap();
        match node.settings() {
            NodeSettings::ColorRamp { ramp, .. } => {
                assert_eq!(ramp.len(), 3);
                assert_eq!(ramp[2], Vec4::ONE);
            }
            other => panic!("unexpected settings {other:?}"),
        }
    }

    #[test]
    fn test_image_length_checked() {
        assert!(ImageData::new("img", ImagePixels::Byte(vec![0; 15]), [2, 2, 1, 4]).is_err());
        let image = ImageData::new("img", ImagePixels::Byte(vec![0; 16]), [2, 2, 1, 4]).unwrap();

        let mut node = ShaderNode::new(0, ShaderNodeKind::ImageTexture);
        node.set_member_image(ShaderNodeKind::ImageTexture, "builtin-data", image)
            .unwrap();
        match node.settings() {
            NodeSettings::Image(settings) => {
                assert_eq!(settings.filename, "img");
                assert!(settings.image.is_some());
            }
            other => panic!("unexpected settings {other:?}"),
        }
    }
}
