//! Lights.

use glam::Vec3;

use crate::handle::ShaderId;

/// Kind of light source. Discriminants are the boundary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum LightKind {
    #[default]
    Point = 0,
    /// Distant light.
    Sun = 1,
    Background = 2,
    Area = 3,
    Spot = 4,
    Triangle = 5,
}

impl LightKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Point),
            1 => Some(Self::Sun),
            2 => Some(Self::Background),
            3 => Some(Self::Area),
            4 => Some(Self::Spot),
            5 => Some(Self::Triangle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    /// Emission shader.
    pub shader: ShaderId,
    /// Position.
    pub co: Vec3,
    pub dir: Vec3,
    pub size: f32,
    pub axis_u: Vec3,
    pub size_u: f32,
    pub axis_v: Vec3,
    pub size_v: f32,
    /// Angular diameter of a sun light, radians.
    pub angle: f32,
    pub spot_angle: f32,
    pub spot_smooth: f32,
    pub cast_shadow: bool,
    pub use_mis: bool,
    pub samples: u32,
    pub max_bounces: u32,
    pub map_resolution: u32,
    pub(crate) dirty: bool,
}

impl Light {
    pub fn new(shader: ShaderId) -> Self {
        Self {
            kind: LightKind::Point,
            shader,
            co: Vec3::ZERO,
            dir: Vec3::NEG_Z,
            size: 0.0,
            axis_u: Vec3::X,
            size_u: 1.0,
            axis_v: Vec3::Y,
            size_v: 1.0,
            angle: 0.0,
            spot_angle: std::f32::consts::FRAC_PI_4,
            spot_smooth: 0.0,
            cast_shadow: true,
            use_mis: false,
            samples: 1,
            max_bounces: 1024,
            map_resolution: 0,
            dirty: true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tag_update(&mut self) {
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_kind_from_raw() {
        assert_eq!(LightKind::from_raw(4), Some(LightKind::Spot));
        assert_eq!(LightKind::from_raw(6), None);
    }
}
