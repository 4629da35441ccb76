//! Render engine collaborator.
//!
//! The host never traces rays itself; it hands scene snapshots and tiles to a
//! [`RenderEngine`]. Every call into the engine goes through [`guarded`], so a
//! panicking engine is reported as [`EngineError::Panicked`] instead of
//! unwinding through a client call.
//!
//! [`PreviewEngine`] is a small CPU ray caster: primary rays only, flat
//! shading from the colour input of the closure wired into the surface
//! output. It is deterministic, which keeps progressive accumulation exact.

use std::panic::{self, AssertUnwindSafe};

use glam::{Vec3, Vec4};

use crate::device::{DeviceCapabilities, DeviceInfo, DeviceKind};
use crate::error::EngineError;
use crate::handle::ShaderId;
use crate::scene::{Ray, Scene};
use crate::session::{BufferParams, PixelSample, Tile};
use crate::shader::{ShaderNodeKind, SocketValue, OUTPUT_NODE};

/// Interface of the path tracer the host fronts.
pub trait RenderEngine: Send + Sync {
    /// Get the engine name.
    fn name(&self) -> &str;

    /// Devices the engine can render on.
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Prepares device `index` for a session.
    fn open_device(&self, index: u32, device: &DeviceInfo) -> Result<(), EngineError>;

    /// Renders one sample of `tile`, writing one [`PixelSample`] per pixel,
    /// row-major within the tile.
    fn render_tile(
        &self,
        scene: &Scene,
        buffer: &BufferParams,
        tile: &Tile,
        sample: u32,
        out: &mut Vec<PixelSample>,
    ) -> Result<(), EngineError>;
}

/// Runs an engine call, converting a panic into [`EngineError::Panicked`].
pub fn guarded<T>(call: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("RenderEngine: panic caught: {message}");
        Err(EngineError::Panicked(message))
    })
}

/// World-space triangle ready for intersection.
struct Triangle {
    v0: Vec3,
    e1: Vec3,
    e2: Vec3,
    shader: ShaderId,
    pass_id: i32,
}

impl Triangle {
    fn normal(&self) -> Vec3 {
        self.e1.cross(self.e2).normalize_or_zero()
    }

    /// Möller-Trumbore, two-sided.
    fn intersect(&self, ray: &Ray) -> Option<f32> {
        let p = ray.dir.cross(self.e2);
        let det = self.e1.dot(p);
        if det.abs() < 1e-8 {
            return None;
        }
        let inv = 1.0 / det;
        let s = ray.origin - self.v0;
        let u = s.dot(p) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(self.e1);
        let v = ray.dir.dot(q) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        Some(self.e2.dot(q) * inv)
    }
}

fn world_triangles(scene: &Scene) -> Vec<Triangle> {
    let mut out = Vec::new();
    for (_, object) in scene.objects() {
        let Some(mesh) = object.mesh.and_then(|id| scene.mesh(id).ok()) else {
            continue;
        };
        let verts: Vec<Vec3> = mesh
            .verts()
            .iter()
            .map(|v| object.transform.transform_point3(*v))
            .collect();
        for triangle in mesh.triangles() {
            let [a, b, c] = triangle.verts.map(|i| verts.get(i as usize).copied());
            let (Some(a), Some(b), Some(c)) = (a, b, c) else {
                continue;
            };
            out.push(Triangle {
                v0: a,
                e1: b - a,
                e2: c - a,
                shader: triangle
                    .shader
                    .or(object.shader)
                    .unwrap_or(mesh.shader),
                pass_id: object.pass_id,
            });
        }
    }
    out
}

/// Colour of the closure wired into the surface output of `shader`.
pub fn surface_color(scene: &Scene, shader: ShaderId) -> Vec3 {
    let Ok(shader) = scene.shader(shader) else {
        return Vec3::ZERO;
    };
    let graph = shader.graph();
    let Some(node) = graph
        .link_into(OUTPUT_NODE, "Surface")
        .and_then(|link| graph.node(link.from_node).ok())
    else {
        return Vec3::ZERO;
    };
    let color = |name| match node.input_value(name) {
        Some(SocketValue::Color(c)) => *c,
        _ => Vec3::ZERO,
    };
    let strength = match node.input_value("Strength") {
        Some(SocketValue::Float(s)) => *s,
        _ => 1.0,
    };
    match node.kind() {
        ShaderNodeKind::PrincipledBsdf => color("Base Color"),
        ShaderNodeKind::Emission | ShaderNodeKind::Background => color("Color") * strength,
        _ => color("Color"),
    }
}

/// Deterministic CPU preview renderer.
#[derive(Debug, Clone)]
pub struct PreviewEngine {
    devices: Vec<DeviceInfo>,
}

impl Default for PreviewEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewEngine {
    /// An engine exposing a single CPU device.
    pub fn new() -> Self {
        Self::with_devices(vec![DeviceInfo::new(DeviceKind::Cpu, "CPU", "CPU")
            .with_capabilities(
                DeviceCapabilities::ADVANCED_SHADING | DeviceCapabilities::BRANCHED_PATH,
            )])
    }

    /// An engine reporting `devices`. Only CPU devices (and multi-devices)
    /// can be opened.
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }

    fn shade(&self, scene: &Scene, triangles: &[Triangle], ray: &Ray) -> PixelSample {
        let camera = scene.camera();
        let hit = triangles
            .iter()
            .filter_map(|t| t.intersect(ray).map(|d| (d, t)))
            .filter(|(d, _)| *d >= camera.near_clip && *d <= camera.far_clip)
            .filter(|(d, _)| !scene.clipping_planes().clips(ray.origin + ray.dir * *d))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match hit {
            Some((depth, triangle)) => {
                let normal = triangle.normal();
                let albedo = surface_color(scene, triangle.shader);
                let facing = normal.dot(ray.dir).abs();
                PixelSample {
                    color: (albedo * facing).extend(1.0),
                    depth,
                    normal,
                    object_id: triangle.pass_id as f32,
                    albedo,
                }
            }
            None => {
                let background = scene.background();
                let world = background
                    .shader
                    .map(|s| surface_color(scene, s))
                    .unwrap_or(Vec3::ZERO);
                let alpha = if background.transparent { 0.0 } else { 1.0 };
                PixelSample {
                    color: Vec4::new(world.x, world.y, world.z, alpha),
                    ..PixelSample::default()
                }
            }
        }
    }
}

impl RenderEngine for PreviewEngine {
    fn name(&self) -> &str {
        "Preview Engine"
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn open_device(&self, index: u32, device: &DeviceInfo) -> Result<(), EngineError> {
        match device.kind {
            DeviceKind::Cpu | DeviceKind::Multi => {
                log::debug!("PreviewEngine: opened device {index} ({})", device.description);
                Ok(())
            }
            _ => Err(EngineError::UnsupportedDevice(index)),
        }
    }

    fn render_tile(
        &self,
        scene: &Scene,
        buffer: &BufferParams,
        tile: &Tile,
        _sample: u32,
        out: &mut Vec<PixelSample>,
    ) -> Result<(), EngineError> {
        let triangles = world_triangles(scene);
        let camera = scene.camera();
        out.clear();
        out.reserve(tile.pixel_count());
        for y in tile.y..tile.y + tile.h {
            for x in tile.x..tile.x + tile.w {
                let ray = camera.ray(
                    buffer.full_x + x,
                    buffer.full_y + y,
                    buffer.full_width,
                    buffer.full_height,
                );
                out.push(self.shade(scene, &triangles, &ray));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SceneParams;
    use crate::shader::Shader;

    /// A red quad filling the view at z = 1.
    fn quad_scene() -> Scene {
        let mut scene = Scene::new(SceneParams::default());
        let red = scene.add_shader(Shader::new());
        let diffuse = scene.add_shader_node(red, ShaderNodeKind::Diffuse).unwrap();
        scene
            .edit_shader_node(red, diffuse, |n| {
                n.set_attribute_vec("Color", Vec3::new(1.0, 0.0, 0.0))
            })
            .unwrap();
        scene
            .connect_shader_nodes(red, (diffuse, "BSDF"), (OUTPUT_NODE, "Surface"))
            .unwrap();

        let object = scene.add_object();
        let mesh = scene.add_mesh_object(object, red).unwrap();
        let m = scene.mesh_mut(mesh).unwrap();
        m.set_verts(&[
            -5.0, -5.0, 1.0, //
            5.0, -5.0, 1.0, //
            5.0, 5.0, 1.0, //
            -5.0, 5.0, 1.0,
        ])
        .unwrap();
        m.set_tris(&[0, 1, 2, 0, 2, 3], None, false).unwrap();
        scene.camera_mut().set_size(4, 4);
        scene.camera_mut().compute_auto_viewplane();
        scene
    }

    fn render(scene: &Scene) -> Vec<PixelSample> {
        let buffer = BufferParams::full(4, 4);
        let tile = Tile { index: 0, x: 0, y: 0, w: 4, h: 4 };
        let mut out = Vec::new();
        PreviewEngine::new()
            .render_tile(scene, &buffer, &tile, 0, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_hit_uses_surface_color() {
        let pixels = render(&quad_scene());
        assert_eq!(pixels.len(), 16);
        for pixel in &pixels {
            assert!(pixel.color.x > 0.9);
            assert_eq!(pixel.color.y, 0.0);
            assert_eq!(pixel.color.w, 1.0);
            assert!(pixel.depth >= 1.0);
        }
    }

    #[test]
    fn test_clipping_plane_removes_geometry() {
        let mut scene = quad_scene();
        // Keep only points with z < 0.5.
        scene
            .clipping_planes_mut()
            .add(Vec4::new(0.0, 0.0, -1.0, 0.5));
        let pixels = render(&scene);
        assert!(pixels.iter().all(|p| p.depth == f32::MAX));
        assert!(pixels.iter().all(|p| p.color.truncate() == Vec3::ZERO));
    }

    #[test]
    fn test_background_shader_and_transparency() {
        let mut scene = Scene::new(SceneParams::default());
        let world = scene.add_shader(Shader::new());
        let bg = scene.add_shader_node(world, ShaderNodeKind::Background).unwrap();
        scene
            .edit_shader_node(world, bg, |n| {
                n.set_attribute_vec("Color", Vec3::new(0.0, 0.0, 1.0))?;
                n.set_attribute_float("Strength", 2.0)
            })
            .unwrap();
        scene
            .connect_shader_nodes(world, (bg, "Background"), (OUTPUT_NODE, "Surface"))
            .unwrap();
        scene.set_background_shader(Some(world)).unwrap();
        scene.background_mut().transparent = true;

        let pixels = render(&scene);
        assert_eq!(pixels[0].color, Vec4::new(0.0, 0.0, 2.0, 0.0));
    }

    #[test]
    fn test_cpu_only_devices_open() {
        let engine = PreviewEngine::new();
        let cuda = DeviceInfo::new(DeviceKind::Cuda, "GPU", "CUDA_0");
        assert!(engine.open_device(0, &engine.devices()[0]).is_ok());
        assert_eq!(
            engine.open_device(3, &cuda),
            Err(EngineError::UnsupportedDevice(3))
        );
    }

    #[test]
    fn test_guarded_catches_panics() {
        let result: Result<(), EngineError> = guarded(|| panic!("kernel exploded"));
        assert_eq!(result, Err(EngineError::Panicked("kernel exploded".into())));
        assert_eq!(guarded(|| Ok(5)), Ok(5));
    }
}
