//! Clipping planes.
//!
//! Planes live in an ordered list and are addressed by position. Discarding a
//! plane keeps its slot; the next add reuses the first discarded slot, so
//! indices handed out earlier stay stable.

use glam::{Vec3, Vec4};

use crate::error::{HostError, HostResult};
use crate::handle::HandleKind;

/// One slot of the clipping plane list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClippingPlane {
    /// Plane equation `a*x + b*y + c*z + d = 0`; points on the negative side
    /// are clipped away.
    Active(Vec4),
    Discarded,
}

impl ClippingPlane {
    /// Packed form handed to kernels: discarded slots are all `f32::MAX`.
    pub fn packed(self) -> [f32; 4] {
        match self {
            Self::Active(plane) => plane.to_array(),
            Self::Discarded => [f32::MAX; 4],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClippingPlanes {
    planes: Vec<ClippingPlane>,
}

impl ClippingPlanes {
    pub fn clear(&mut self) {
        self.planes.clear();
    }

    /// Adds a plane and returns its index.
    pub fn add(&mut self, plane: Vec4) -> u32 {
        if let Some(index) = self
            .planes
            .iter()
            .position(|p| matches!(p, ClippingPlane::Discarded))
        {
            self.planes[index] = ClippingPlane::Active(plane);
            return index as u32;
        }
        self.planes.push(ClippingPlane::Active(plane));
        (self.planes.len() - 1) as u32
    }

    pub fn discard(&mut self, index: u32) -> HostResult<()> {
        *self.slot(index)? = ClippingPlane::Discarded;
        Ok(())
    }

    /// Replaces the plane at `index`, reactivating a discarded slot.
    pub fn set(&mut self, index: u32, plane: Vec4) -> HostResult<()> {
        *self.slot(index)? = ClippingPlane::Active(plane);
        Ok(())
    }

    fn slot(&mut self, index: u32) -> HostResult<&mut ClippingPlane> {
        self.planes
            .get_mut(index as usize)
            .ok_or(HostError::invalid(HandleKind::ClippingPlane, u64::from(index)))
    }

    pub fn get(&self, index: u32) -> Option<ClippingPlane> {
        self.planes.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn active(&self) -> impl Iterator<Item = Vec4> + '_ {
        self.planes.iter().filter_map(|p| match p {
            ClippingPlane::Active(plane) => Some(*plane),
            ClippingPlane::Discarded => None,
        })
    }

    /// Whether `point` is removed by any active plane.
    pub fn clips(&self, point: Vec3) -> bool {
        self.active().any(|plane| plane.truncate().dot(point) + plane.w < 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_reuses_discarded_slot() {
        let mut planes = ClippingPlanes::default();
        let a = planes.add(Vec4::X);
        let b = planes.add(Vec4::Y);
        assert_eq!((a, b), (0, 1));

        planes.discard(a).unwrap();
        assert_eq!(planes.get(a), Some(ClippingPlane::Discarded));
        assert_eq!(planes.active().count(), 1);

        let c = planes.add(Vec4::Z);
        assert_eq!(c, 0);
        assert_eq!(planes.len(), 2);
    }

    #[test]
    fn test_unknown_index() {
        let mut planes = ClippingPlanes::default();
        assert_eq!(
            planes.discard(3),
            Err(HostError::invalid(HandleKind::ClippingPlane, 3))
        );
    }

    #[test]
    fn test_clips_negative_side() {
        let mut planes = ClippingPlanes::default();
        planes.add(Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert!(planes.clips(Vec3::new(0.0, 0.0, -1.0)));
        assert!(!planes.clips(Vec3::new(0.0, 0.0, 1.0)));
        assert_eq!(ClippingPlane::Discarded.packed(), [f32::MAX; 4]);
    }
}
