//! Scene objects: placed instances of a mesh.

use bitflags::bitflags;
use glam::Mat4;

use crate::handle::{MeshId, ShaderId};

bitflags! {
    /// Ray types an object (or the background) is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RayVisibility: u32 {
        const CAMERA = 1 << 0;
        const REFLECT = 1 << 1;
        const TRANSMIT = 1 << 2;
        const DIFFUSE = 1 << 3;
        const GLOSSY = 1 << 4;
        const SINGULAR = 1 << 5;
        const TRANSPARENT = 1 << 6;
        const SHADOW = 1 << 7;
        const VOLUME_SCATTER = 1 << 8;
    }
}

impl Default for RayVisibility {
    fn default() -> Self {
        Self::all()
    }
}

/// Builds a transform from 16 row-major floats.
pub fn mat4_from_rows(rows: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(rows).transpose()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub mesh: Option<MeshId>,
    /// Shader override for the whole object.
    pub shader: Option<ShaderId>,
    /// Object to world transform.
    pub transform: Mat4,
    /// Object coordinate system frame for texture lookups.
    pub ocs_frame: Mat4,
    pub visibility: RayVisibility,
    pub is_shadow_catcher: bool,
    pub mesh_light_no_cast_shadow: bool,
    pub is_block_instance: bool,
    pub cutout: bool,
    pub ignore_cutout: bool,
    pub pass_id: i32,
    pub random_id: u32,
    pub(crate) dirty: bool,
}

impl Default for Object {
    fn default() -> Self {
        Self {
            mesh: None,
            shader: None,
            transform: Mat4::IDENTITY,
            ocs_frame: Mat4::IDENTITY,
            visibility: RayVisibility::all(),
            is_shadow_catcher: false,
            mesh_light_no_cast_shadow: false,
            is_block_instance: false,
            cutout: false,
            ignore_cutout: false,
            pass_id: 0,
            random_id: 0,
            dirty: true,
        }
    }
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tag_update(&mut self) {
        self.dirty = true;
    }
}
