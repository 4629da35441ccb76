//! The closed set of shader node kinds and their socket layouts.

use super::socket::SocketSpec;
use super::socket::SocketType::{Closure, Color, Float, Vector};

macro_rules! node_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Kind of a shader node. Discriminants are the boundary values.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum ShaderNodeKind {
            $($variant),*
        }

        impl ShaderNodeKind {
            /// Every kind, in discriminant order.
            pub const ALL: &'static [ShaderNodeKind] = &[$(ShaderNodeKind::$variant),*];

            /// Engine-side node name.
            pub fn name(self) -> &'static str {
                match self {
                    $(ShaderNodeKind::$variant => $name),*
                }
            }
        }
    };
}

node_kinds! {
    Background => "background",
    Output => "output",
    Diffuse => "diffuse_bsdf",
    Anisotropic => "anisotropic_bsdf",
    Translucent => "translucent_bsdf",
    Transparent => "transparent_bsdf",
    Velvet => "velvet_bsdf",
    Toon => "toon_bsdf",
    Glossy => "glossy_bsdf",
    Glass => "glass_bsdf",
    Refraction => "refraction_bsdf",
    Hair => "hair_bsdf",
    Emission => "emission",
    AmbientOcclusion => "ambient_occlusion",
    AbsorptionVolume => "absorption_volume",
    ScatterVolume => "scatter_volume",
    SubsurfaceScattering => "subsurface_scattering",
    Value => "value",
    Color => "color",
    MixClosure => "mix_closure",
    AddClosure => "add_closure",
    Invert => "invert",
    Mix => "mix",
    Gamma => "gamma",
    Wavelength => "wavelength",
    Blackbody => "blackbody",
    Camera => "camera_info",
    Fresnel => "fresnel",
    Math => "math",
    ImageTexture => "image_texture",
    EnvironmentTexture => "environment_texture",
    BrickTexture => "brick_texture",
    SkyTexture => "sky_texture",
    CheckerTexture => "checker_texture",
    NoiseTexture => "noise_texture",
    WaveTexture => "wave_texture",
    MagicTexture => "magic_texture",
    MusgraveTexture => "musgrave_texture",
    TextureCoordinate => "texture_coordinate",
    Bump => "bump",
    RgbToBw => "rgb_to_bw",
    RgbToLuminance => "rgb_to_luminance",
    LightPath => "light_path",
    LightFalloff => "light_falloff",
    LayerWeight => "layer_weight",
    GeometryInfo => "geometry",
    VoronoiTexture => "voronoi_texture",
    CombineXyz => "combine_xyz",
    SeparateXyz => "separate_xyz",
    HsvSeparate => "separate_hsv",
    HsvCombine => "combine_hsv",
    RgbSeparate => "separate_rgb",
    RgbCombine => "combine_rgb",
    Mapping => "mapping",
    Holdout => "holdout",
    HueSat => "hsv",
    BrightContrast => "brightness_contrast",
    GradientTexture => "gradient_texture",
    ColorRamp => "rgb_ramp",
    VectMath => "vector_math",
    MatrixMath => "matrix_math",
    PrincipledBsdf => "principled_bsdf",
    Attribute => "attribute",
    NormalMap => "normal_map",
    Wireframe => "wireframe",
    ObjectInfo => "object_info",
    Tangent => "tangent",
    Displacement => "displacement",
}

// Struct literals keep the socket tables promotable to `'static`.
macro_rules! s {
    ($name:literal, $ty:ident) => {
        SocketSpec {
            name: $name,
            ty: $ty,
        }
    };
}

const BSDF_OUT: &[SocketSpec] = &[s!("BSDF", Closure)];
const COLOR_OUT: &[SocketSpec] = &[s!("Color", Color)];
const TEXTURE_OUT: &[SocketSpec] = &[s!("Color", Color), s!("Fac", Float)];
const IMAGE_OUT: &[SocketSpec] = &[s!("Color", Color), s!("Alpha", Float)];
const VECTOR_IN: &[SocketSpec] = &[s!("Vector", Vector)];
const XYZ: &[SocketSpec] = &[s!("X", Float), s!("Y", Float), s!("Z", Float)];
const HSV: &[SocketSpec] = &[s!("H", Float), s!("S", Float), s!("V", Float)];
const RGB: &[SocketSpec] = &[s!("R", Float), s!("G", Float), s!("B", Float)];

impl ShaderNodeKind {
    /// Converts a boundary discriminant.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Input sockets, in declaration order.
    pub fn inputs(self) -> &'static [SocketSpec] {
        use ShaderNodeKind as K;
        match self {
            K::Background => &[s!("Color", Color), s!("Strength", Float)],
            K::Output => &[
                s!("Surface", Closure),
                s!("Volume", Closure),
                s!("Displacement", Vector),
                s!("Normal", Vector),
            ],
            K::Diffuse => &[s!("Color", Color), s!("Normal", Vector), s!("Roughness", Float)],
            K::Anisotropic => &[
                s!("Color", Color),
                s!("Normal", Vector),
                s!("Tangent", Vector),
                s!("Roughness", Float),
                s!("Anisotropy", Float),
                s!("Rotation", Float),
            ],
            K::Translucent => &[s!("Color", Color), s!("Normal", Vector)],
            K::Transparent => &[s!("Color", Color)],
            K::Velvet => &[s!("Color", Color), s!("Normal", Vector), s!("Sigma", Float)],
            K::Toon => &[
                s!("Color", Color),
                s!("Normal", Vector),
                s!("Size", Float),
                s!("Smooth", Float),
            ],
            K::Glossy => &[s!("Color", Color), s!("Normal", Vector), s!("Roughness", Float)],
            K::Glass | K::Refraction => &[
                s!("Color", Color),
                s!("Normal", Vector),
                s!("Roughness", Float),
                s!("IOR", Float),
            ],
            K::Hair => &[
                s!("Color", Color),
                s!("Offset", Float),
                s!("RoughnessU", Float),
                s!("RoughnessV", Float),
                s!("Tangent", Vector),
            ],
            K::Emission => &[s!("Color", Color), s!("Strength", Float)],
            K::AmbientOcclusion => &[s!("Color", Color)],
            K::AbsorptionVolume => &[s!("Color", Color), s!("Density", Float)],
            K::ScatterVolume => &[s!("Color", Color), s!("Density", Float), s!("Anisotropy", Float)],
            K::SubsurfaceScattering => &[
                s!("Color", Color),
                s!("Scale", Float),
                s!("Radius", Vector),
                s!("Sharpness", Float),
                s!("Texture Blur", Float),
                s!("Normal", Vector),
            ],
            K::Value | K::Color => &[],
            K::MixClosure => &[
                s!("Fac", Float),
                s!("Closure1", Closure),
                s!("Closure2", Closure),
            ],
            K::AddClosure => &[s!("Closure1", Closure), s!("Closure2", Closure)],
            K::Invert => &[s!("Fac", Float), s!("Color", Color)],
            K::Mix => &[s!("Fac", Float), s!("Color1", Color), s!("Color2", Color)],
            K::Gamma => &[s!("Color", Color), s!("Gamma", Float)],
            K::Wavelength => &[s!("Wavelength", Float)],
            K::Blackbody => &[s!("Temperature", Float)],
            K::Camera => &[],
            K::Fresnel => &[s!("Normal", Vector), s!("IOR", Float)],
            K::Math => &[s!("Value1", Float), s!("Value2", Float)],
            K::ImageTexture | K::EnvironmentTexture | K::SkyTexture | K::GradientTexture => {
                VECTOR_IN
            }
            K::BrickTexture => &[
                s!("Vector", Vector),
                s!("Color1", Color),
                s!("Color2", Color),
                s!("Mortar", Color),
                s!("Scale", Float),
                s!("Mortar Size", Float),
                s!("Bias", Float),
                s!("Brick Width", Float),
                s!("Row Height", Float),
            ],
            K::CheckerTexture => &[
                s!("Vector", Vector),
                s!("Color1", Color),
                s!("Color2", Color),
                s!("Scale", Float),
            ],
            K::NoiseTexture => &[
                s!("Vector", Vector),
                s!("Scale", Float),
                s!("Detail", Float),
                s!("Distortion", Float),
            ],
            K::WaveTexture => &[
                s!("Vector", Vector),
                s!("Scale", Float),
                s!("Distortion", Float),
                s!("Detail", Float),
                s!("Detail Scale", Float),
            ],
            K::MagicTexture => &[s!("Vector", Vector), s!("Scale", Float), s!("Distortion", Float)],
            K::MusgraveTexture => &[
                s!("Vector", Vector),
                s!("Scale", Float),
                s!("Detail", Float),
                s!("Dimension", Float),
                s!("Lacunarity", Float),
                s!("Offset", Float),
                s!("Gain", Float),
            ],
            K::TextureCoordinate => &[],
            K::Bump => &[
                s!("Strength", Float),
                s!("Distance", Float),
                s!("Height", Float),
                s!("Normal", Vector),
            ],
            K::RgbToBw | K::RgbToLuminance => &[s!("Color", Color)],
            K::LightPath => &[],
            K::LightFalloff => &[s!("Strength", Float), s!("Smooth", Float)],
            K::LayerWeight => &[s!("Blend", Float), s!("Normal", Vector)],
            K::GeometryInfo => &[],
            K::VoronoiTexture => &[s!("Vector", Vector), s!("Scale", Float)],
            K::CombineXyz => XYZ,
            K::SeparateXyz => VECTOR_IN,
            K::HsvSeparate => &[s!("Color", Color)],
            K::HsvCombine => HSV,
            K::RgbSeparate => &[s!("Image", Color)],
            K::RgbCombine => RGB,
            K::Mapping | K::MatrixMath => VECTOR_IN,
            K::Holdout => &[],
            K::HueSat => &[
                s!("Hue", Float),
                s!("Saturation", Float),
                s!("Value", Float),
                s!("Fac", Float),
                s!("Color", Color),
            ],
            K::BrightContrast => &[s!("Color", Color), s!("Bright", Float), s!("Contrast", Float)],
            K::ColorRamp => &[s!("Fac", Float)],
            K::VectMath => &[s!("Vector1", Vector), s!("Vector2", Vector)],
            K::PrincipledBsdf => &[
                s!("Base Color", Color),
                s!("Subsurface Color", Color),
                s!("Metallic", Float),
                s!("Subsurface", Float),
                s!("Subsurface Radius", Vector),
                s!("Specular", Float),
                s!("Roughness", Float),
                s!("Specular Tint", Float),
                s!("Anisotropic", Float),
                s!("Sheen", Float),
                s!("Sheen Tint", Float),
                s!("Clearcoat", Float),
                s!("Clearcoat Roughness", Float),
                s!("IOR", Float),
                s!("Transmission", Float),
                s!("Anisotropic Rotation", Float),
                s!("Normal", Vector),
                s!("Clearcoat Normal", Vector),
                s!("Tangent", Vector),
            ],
            K::Attribute | K::ObjectInfo | K::Tangent => &[],
            K::NormalMap => &[s!("Strength", Float), s!("Color", Color)],
            K::Wireframe => &[s!("Size", Float)],
            K::Displacement => &[
                s!("Height", Float),
                s!("Midlevel", Float),
                s!("Scale", Float),
                s!("Normal", Vector),
            ],
        }
    }

    /// Output sockets, in declaration order.
    pub fn outputs(self) -> &'static [SocketSpec] {
        use ShaderNodeKind as K;
        match self {
            K::Background => &[s!("Background", Closure)],
            K::Output => &[],
            K::Diffuse
            | K::Anisotropic
            | K::Translucent
            | K::Transparent
            | K::Velvet
            | K::Toon
            | K::Glossy
            | K::Glass
            | K::Refraction
            | K::Hair
            | K::PrincipledBsdf => BSDF_OUT,
            K::Emission => &[s!("Emission", Closure)],
            K::AmbientOcclusion => &[s!("AO", Closure)],
            K::AbsorptionVolume | K::ScatterVolume => &[s!("Volume", Closure)],
            K::SubsurfaceScattering => &[s!("BSSRDF", Closure)],
            K::Value => &[s!("Value", Float)],
            K::Color
            | K::Invert
            | K::Mix
            | K::Gamma
            | K::Wavelength
            | K::Blackbody
            | K::SkyTexture
            | K::HsvCombine
            | K::HueSat
            | K::BrightContrast => COLOR_OUT,
            K::MixClosure | K::AddClosure => &[s!("Closure", Closure)],
            K::Camera => &[
                s!("View Vector", Vector),
                s!("View Z Depth", Float),
                s!("View Distance", Float),
            ],
            K::Fresnel => &[s!("Fac", Float)],
            K::Math => &[s!("Value", Float)],
            K::ImageTexture | K::EnvironmentTexture | K::ColorRamp => IMAGE_OUT,
            K::BrickTexture
            | K::CheckerTexture
            | K::NoiseTexture
            | K::WaveTexture
            | K::MagicTexture
            | K::MusgraveTexture
            | K::VoronoiTexture
            | K::GradientTexture => TEXTURE_OUT,
            K::TextureCoordinate => &[
                s!("Generated", Vector),
                s!("Normal", Vector),
                s!("UV", Vector),
                s!("Object", Vector),
                s!("Camera", Vector),
                s!("Window", Vector),
                s!("Reflection", Vector),
            ],
            K::Bump | K::NormalMap => &[s!("Normal", Vector)],
            K::RgbToBw | K::RgbToLuminance => &[s!("Val", Float)],
            K::LightPath => &[
                s!("Is Camera Ray", Float),
                s!("Is Shadow Ray", Float),
                s!("Is Diffuse Ray", Float),
                s!("Is Glossy Ray", Float),
                s!("Is Singular Ray", Float),
                s!("Is Reflection Ray", Float),
                s!("Is Transmission Ray", Float),
                s!("Is Volume Scatter Ray", Float),
                s!("Ray Length", Float),
                s!("Ray Depth", Float),
                s!("Transparent Depth", Float),
                s!("Transmission Depth", Float),
            ],
            K::LightFalloff => &[
                s!("Quadratic", Float),
                s!("Linear", Float),
                s!("Constant", Float),
            ],
            K::LayerWeight => &[s!("Fresnel", Float), s!("Facing", Float)],
            K::GeometryInfo => &[
                s!("Position", Vector),
                s!("Normal", Vector),
                s!("Tangent", Vector),
                s!("True Normal", Vector),
                s!("Incoming", Vector),
                s!("Parametric", Vector),
                s!("Backfacing", Float),
                s!("Pointiness", Float),
            ],
            K::CombineXyz | K::Mapping | K::MatrixMath => &[s!("Vector", Vector)],
            K::SeparateXyz => XYZ,
            K::HsvSeparate => HSV,
            K::RgbSeparate => RGB,
            K::RgbCombine => &[s!("Image", Color)],
            K::Holdout => &[s!("Holdout", Closure)],
            K::VectMath => &[s!("Value", Float), s!("Vector", Vector)],
            K::Attribute => &[s!("Color", Color), s!("Vector", Vector), s!("Fac", Float)],
            K::Wireframe => &[s!("Fac", Float)],
            K::ObjectInfo => &[
                s!("Location", Vector),
                s!("Object Index", Float),
                s!("Material Index", Float),
                s!("Random", Float),
            ],
            K::Tangent => &[s!("Tangent", Vector)],
            K::Displacement => &[s!("Displacement", Vector)],
        }
    }

    /// Looks up an input socket by name.
    pub fn input(self, name: &str) -> Option<SocketSpec> {
        self.inputs().iter().copied().find(|spec| spec.name == name)
    }

    /// Looks up an output socket by name.
    pub fn output(self, name: &str) -> Option<SocketSpec> {
        self.outputs().iter().copied().find(|spec| spec.name == name)
    }

    /// Whether the kind carries a texture mapping block.
    pub fn has_texture_mapping(self) -> bool {
        use ShaderNodeKind as K;
        matches!(
            self,
            K::ImageTexture
                | K::EnvironmentTexture
                | K::BrickTexture
                | K::SkyTexture
                | K::CheckerTexture
                | K::NoiseTexture
                | K::WaveTexture
                | K::MagicTexture
                | K::MusgraveTexture
                | K::VoronoiTexture
                | K::GradientTexture
                | K::Mapping
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_match_table_order() {
        assert_eq!(ShaderNodeKind::ALL.len(), 68);
        for (index, kind) in ShaderNodeKind::ALL.iter().enumerate() {
            assert_eq!(*kind as u32, index as u32);
            assert_eq!(ShaderNodeKind::from_raw(index as u32), Some(*kind));
        }
        assert_eq!(ShaderNodeKind::from_raw(68), None);
        assert_eq!(ShaderNodeKind::from_raw(22), Some(ShaderNodeKind::Mix));
    }

    #[test]
    fn test_socket_names_are_unique_per_kind() {
        for kind in ShaderNodeKind::ALL {
            for sockets in [kind.inputs(), kind.outputs()] {
                for (i, a) in sockets.iter().enumerate() {
                    assert!(
                        sockets[i + 1..].iter().all(|b| b.name != a.name),
                        "{kind:?} has duplicate socket {}",
                        a.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_kind_but_output_has_an_output() {
        for kind in ShaderNodeKind::ALL {
            if *kind != ShaderNodeKind::Output {
                assert!(!kind.outputs().is_empty(), "{kind:?}");
            }
        }
        assert!(ShaderNodeKind::Output.input("Surface").is_some());
    }
}
