//! Scene camera.
//!
//! The camera looks down its local +Z axis; `matrix` maps camera space to
//! world space. The viewplane is expressed in screen units where the shorter
//! image side spans `[-1, 1]`.

use glam::{Mat4, Vec3};

/// Projection model. Discriminants are the boundary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CameraKind {
    #[default]
    Perspective = 0,
    Orthographic = 1,
    Panorama = 2,
}

impl CameraKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Perspective),
            1 => Some(Self::Orthographic),
            2 => Some(Self::Panorama),
            _ => None,
        }
    }
}

/// Panorama mapping used when the camera is [`CameraKind::Panorama`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PanoramaKind {
    #[default]
    Equirectangular = 0,
    FisheyeEquidistant = 1,
    FisheyeEquisolid = 2,
}

impl PanoramaKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Equirectangular),
            1 => Some(Self::FisheyeEquidistant),
            2 => Some(Self::FisheyeEquisolid),
            _ => None,
        }
    }
}

/// Screen-space window of the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewplane {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

impl Default for Viewplane {
    fn default() -> Self {
        Self {
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
        }
    }
}

/// A primary ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub kind: CameraKind,
    pub panorama: PanoramaKind,
    pub width: u32,
    pub height: u32,
    pub matrix: Mat4,
    pub viewplane: Viewplane,
    /// Vertical field of view, radians.
    pub fov: f32,
    pub sensor_width: f32,
    pub sensor_height: f32,
    pub near_clip: f32,
    pub far_clip: f32,
    pub aperture_size: f32,
    pub aperture_ratio: f32,
    pub blades: u32,
    pub blades_rotation: f32,
    pub focal_distance: f32,
    pub shutter_time: f32,
    pub fisheye_fov: f32,
    pub fisheye_lens: f32,
    pub(crate) dirty: bool,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            kind: CameraKind::Perspective,
            panorama: PanoramaKind::Equirectangular,
            width: 1024,
            height: 512,
            matrix: Mat4::IDENTITY,
            viewplane: Viewplane::default(),
            fov: std::f32::consts::FRAC_PI_4,
            sensor_width: 36.0,
            sensor_height: 24.0,
            near_clip: 1e-5,
            far_clip: 1e5,
            aperture_size: 0.0,
            aperture_ratio: 1.0,
            blades: 0,
            blades_rotation: 0.0,
            focal_distance: 10.0,
            shutter_time: 1.0,
            fisheye_fov: std::f32::consts::PI,
            fisheye_lens: 10.5,
            dirty: true,
        };
        camera.compute_auto_viewplane();
        camera
    }
}

impl Camera {
    /// Sets the image size in pixels.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.dirty = true;
    }

    /// Fits the viewplane to the image aspect ratio.
    pub fn compute_auto_viewplane(&mut self) {
        let aspect = self.width.max(1) as f32 / self.height.max(1) as f32;
        self.viewplane = if self.width >= self.height {
            Viewplane {
                left: -aspect,
                right: aspect,
                bottom: -1.0,
                top: 1.0,
            }
        } else {
            Viewplane {
                left: -1.0,
                right: 1.0,
                bottom: -1.0 / aspect,
                top: 1.0 / aspect,
            }
        };
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flags the camera for upload on the next scene snapshot.
    pub fn tag_update(&mut self) {
        self.dirty = true;
    }

    /// Primary ray through the centre of pixel (`x`, `y`) of a
    /// `width` x `height` image, `y` growing downwards.
    pub fn ray(&self, x: u32, y: u32, width: u32, height: u32) -> Ray {
        let u = (x as f32 + 0.5) / width.max(1) as f32;
        let v = (y as f32 + 0.5) / height.max(1) as f32;
        let plane = self.viewplane;
        let sx = plane.left + u * (plane.right - plane.left);
        let sy = plane.top - v * (plane.top - plane.bottom);

        let (origin, dir) = match self.kind {
            CameraKind::Perspective => {
                let scale = (self.fov * 0.5).tan();
                (Vec3::ZERO, Vec3::new(sx * scale, sy * scale, 1.0))
            }
            CameraKind::Orthographic => (Vec3::new(sx, sy, 0.0), Vec3::Z),
            CameraKind::Panorama => (Vec3::ZERO, self.panorama_dir(u, v)),
        };
        Ray {
            origin: self.matrix.transform_point3(origin),
            dir: self.matrix.transform_vector3(dir).normalize_or_zero(),
        }
    }

    fn panorama_dir(&self, u: f32, v: f32) -> Vec3 {
        use std::f32::consts::{PI, TAU};
        match self.panorama {
            PanoramaKind::Equirectangular => {
                let phi = (u - 0.5) * TAU;
                let theta = (0.5 - v) * PI;
                Vec3::new(theta.cos() * phi.sin(), theta.sin(), theta.cos() * phi.cos())
            }
            PanoramaKind::FisheyeEquidistant | PanoramaKind::FisheyeEquisolid => {
                let px = u * 2.0 - 1.0;
                let py = 1.0 - v * 2.0;
                let r = (px * px + py * py).sqrt();
                let theta = match self.panorama {
                    PanoramaKind::FisheyeEquidistant => r * self.fisheye_fov * 0.5,
                    _ => {
                        let half = self.sensor_width * 0.5;
                        2.0 * ((r * half) / (2.0 * self.fisheye_lens)).clamp(-1.0, 1.0).asin()
                    }
                };
                let phi = py.atan2(px);
                Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
            }
        }
    }
}
