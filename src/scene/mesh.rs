//! Triangle meshes.
//!
//! Vertex and triangle storage follows the engine: flat arrays that the
//! caller sizes with [`Mesh::resize`] or [`Mesh::reserve`] and then fills.
//! Resizing never repairs references: slots added by a resize hold sentinel
//! values, and triangles that point past the new vertex count stay as they
//! are. [`Mesh::validate`] reports both before a render.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};

use crate::error::{HostError, HostResult};
use crate::handle::ShaderId;

/// Vertex index of a triangle slot that was never filled.
pub const UNSET_INDEX: u32 = u32::MAX;

/// One triangle of a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub verts: [u32; 3],
    /// Per-triangle shader override. `None` uses the mesh shader.
    pub shader: Option<ShaderId>,
    pub smooth: bool,
}

impl Triangle {
    /// A triangle slot created by a resize and not yet filled.
    pub const UNSET: Triangle = Triangle {
        verts: [UNSET_INDEX; 3],
        shader: None,
        smooth: false,
    };

    pub fn new(verts: [u32; 3], shader: Option<ShaderId>, smooth: bool) -> Self {
        Self {
            verts,
            shader,
            smooth,
        }
    }
}

fn triples(values: &[f32], what: &str) -> HostResult<Vec<Vec3>> {
    let triples: &[[f32; 3]] = bytemuck::try_cast_slice(values).map_err(|_| {
        HostError::argument(format!(
            "{what} needs 3 floats per entry, got {} floats",
            values.len()
        ))
    })?;
    Ok(triples.iter().copied().map(Vec3::from_array).collect())
}

/// Triangle mesh with per-vertex and per-corner attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Shader used by triangles without an override.
    pub shader: ShaderId,
    verts: Vec<Vec3>,
    triangles: Vec<Triangle>,
    /// UV maps by name, one entry per triangle corner.
    uv_maps: BTreeMap<String, Vec<Vec2>>,
    normals: Vec<Vec3>,
    colors: Vec<Vec3>,
    /// UV maps for which a tangent-space attribute was requested.
    tangent_maps: Vec<String>,
    needs_rebuild: bool,
    pub(crate) dirty: bool,
}

impl Mesh {
    pub fn new(shader: ShaderId) -> Self {
        Self {
            shader,
            verts: Vec::new(),
            triangles: Vec::new(),
            uv_maps: BTreeMap::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            tangent_maps: Vec::new(),
            needs_rebuild: true,
            dirty: true,
        }
    }

    pub fn verts(&self) -> &[Vec3] {
        &self.verts
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    pub fn uv_map(&self, name: &str) -> Option<&[Vec2]> {
        self.uv_maps.get(name).map(Vec::as_slice)
    }

    pub fn tangent_maps(&self) -> &[String] {
        &self.tangent_maps
    }

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether `float_count` vertex coordinates would overwrite the current
    /// vertices in place rather than change the vertex count.
    pub fn verts_fit(&self, float_count: usize) -> bool {
        float_count == self.verts.len() * 3
    }

    /// Replaces the vertex positions from packed `xyz` floats.
    pub fn set_verts(&mut self, coords: &[f32]) -> HostResult<()> {
        let verts = triples(coords, "vertex array")?;
        if verts.len() != self.verts.len() {
            self.needs_rebuild = true;
        }
        self.verts = verts;
        self.dirty = true;
        Ok(())
    }

    /// Replaces all triangles from packed vertex index triples.
    pub fn set_tris(&mut self, faces: &[u32], shader: Option<ShaderId>, smooth: bool) -> HostResult<()> {
        if faces.len() % 3 != 0 {
            return Err(HostError::argument(format!(
                "triangle array needs 3 indices per triangle, got {} indices",
                faces.len()
            )));
        }
        self.triangles = faces
            .chunks_exact(3)
            .map(|f| Triangle::new([f[0], f[1], f[2]], shader, smooth))
            .collect();
        self.needs_rebuild = true;
        self.dirty = true;
        Ok(())
    }

    /// Overwrites the already allocated triangle slot `index`.
    pub fn set_triangle(&mut self, index: usize, triangle: Triangle) -> HostResult<()> {
        let count = self.triangles.len();
        let slot = self.triangles.get_mut(index).ok_or_else(|| {
            HostError::argument(format!("triangle {index} is out of range ({count} triangles)"))
        })?;
        *slot = triangle;
        self.needs_rebuild = true;
        self.dirty = true;
        Ok(())
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
        self.needs_rebuild = true;
        self.dirty = true;
    }

    /// Sets the per-corner UVs of map `name` from packed `uv` floats.
    pub fn set_uvs(&mut self, name: &str, uvs: &[f32]) -> HostResult<()> {
        let pairs: &[[f32; 2]] = bytemuck::try_cast_slice(uvs).map_err(|_| {
            HostError::argument(format!("uv map '{name}' needs 2 floats per corner"))
        })?;
        self.uv_maps.insert(
            name.to_string(),
            pairs.iter().copied().map(Vec2::from_array).collect(),
        );
        self.dirty = true;
        Ok(())
    }

    pub fn set_vertex_normals(&mut self, normals: &[f32]) -> HostResult<()> {
        self.normals = triples(normals, "vertex normal array")?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_vertex_colors(&mut self, colors: &[f32]) -> HostResult<()> {
        self.colors = triples(colors, "vertex color array")?;
        self.dirty = true;
        Ok(())
    }

    /// Sets the smooth flag on every triangle.
    pub fn set_smooth(&mut self, smooth: bool) {
        for triangle in &mut self.triangles {
            triangle.smooth = smooth;
        }
        self.dirty = true;
    }

    /// Removes all geometry and attributes.
    pub fn clear(&mut self) {
        self.verts.clear();
        self.triangles.clear();
        self.uv_maps.clear();
        self.normals.clear();
        self.colors.clear();
        self.needs_rebuild = true;
        self.dirty = true;
    }

    pub fn reserve(&mut self, verts: usize, triangles: usize) {
        self.verts.reserve(verts.saturating_sub(self.verts.len()));
        self.triangles
            .reserve(triangles.saturating_sub(self.triangles.len()));
    }

    /// Resizes the vertex and triangle arrays.
    ///
    /// New vertex slots are NaN and new triangle slots are [`Triangle::UNSET`]
    /// until the caller fills them. Triangles kept by the resize are not
    /// touched, even if they now reference removed vertices.
    pub fn resize(&mut self, verts: usize, triangles: usize) {
        self.verts.resize(verts, Vec3::NAN);
        self.triangles.resize(triangles, Triangle::UNSET);
        self.needs_rebuild = true;
        self.dirty = true;
    }

    /// Marks the mesh for a full acceleration structure rebuild.
    pub fn tag_rebuild(&mut self) {
        self.needs_rebuild = true;
        self.dirty = true;
    }

    /// Requests a tangent-space attribute generated from UV map `uv_map`.
    pub fn request_tangent_space(&mut self, uv_map: &str) {
        if !self.tangent_maps.iter().any(|m| m == uv_map) {
            self.tangent_maps.push(uv_map.to_string());
        }
        self.dirty = true;
    }

    pub(crate) fn clear_update_flags(&mut self) {
        self.needs_rebuild = false;
        self.dirty = false;
    }

    /// Checks that the mesh can be rendered as it is.
    pub fn validate(&self) -> HostResult<()> {
        let vertex_count = self.verts.len();
        if let Some(index) = self.verts.iter().position(|v| !v.is_finite()) {
            return Err(HostError::Validation(format!(
                "vertex {index} is unset or not finite"
            )));
        }
        for (index, triangle) in self.triangles.iter().enumerate() {
            if let Some(&vertex) = triangle.verts.iter().find(|&&v| v as usize >= vertex_count) {
                return Err(HostError::Validation(if vertex == UNSET_INDEX {
                    format!("triangle {index} is unset")
                } else {
                    format!(
                        "triangle {index} references vertex {vertex} but the mesh has {vertex_count} vertices"
                    )
                }));
            }
        }
        if !self.normals.is_empty() && self.normals.len() != vertex_count {
            return Err(HostError::Validation(format!(
                "{} vertex normals for {vertex_count} vertices",
                self.normals.len()
            )));
        }
        if !self.colors.is_empty() && self.colors.len() != vertex_count {
            return Err(HostError::Validation(format!(
                "{} vertex colors for {vertex_count} vertices",
                self.colors.len()
            )));
        }
        let corners = self.triangles.len() * 3;
        for (name, uvs) in &self.uv_maps {
            if uvs.len() != corners {
                return Err(HostError::Validation(format!(
                    "uv map '{name}' has {} entries for {corners} triangle corners",
                    uvs.len()
                )));
            }
        }
        if let Some(missing) = self
            .tangent_maps
            .iter()
            .find(|name| !self.uv_maps.contains_key(name.as_str()))
        {
            return Err(HostError::Validation(format!(
                "tangent space requested for missing uv map '{missing}'"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn shader() -> ShaderId {
        ShaderId::from(KeyData::from_ffi(1))
    }

    fn quad() -> Mesh {
        let mut mesh = Mesh::new(shader());
        mesh.set_verts(&[
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ])
        .unwrap();
        mesh.set_tris(&[0, 1, 2, 0, 2, 3], None, false).unwrap();
        mesh
    }

    #[test]
    fn test_valid_mesh() {
        let mesh = quad();
        assert_eq!(mesh.verts().len(), 4);
        assert_eq!(mesh.triangles().len(), 2);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_shrinking_verts_invalidates_triangles() {
        let mut mesh = quad();
        mesh.resize(3, 2);
        assert_eq!(mesh.triangles().len(), 2);
        let err = mesh.validate().unwrap_err();
        assert_eq!(
            err,
            HostError::Validation(
                "triangle 1 references vertex 3 but the mesh has 3 vertices".to_string()
            )
        );
    }

    #[test]
    fn test_growing_requires_repopulation() {
        let mut mesh = quad();
        mesh.resize(4, 3);
        assert!(matches!(mesh.validate(), Err(HostError::Validation(_))));
        mesh.set_triangle(2, Triangle::new([1, 2, 3], None, true))
            .unwrap();
        assert!(mesh.validate().is_ok());

        mesh.resize(5, 3);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_bad_array_lengths() {
        let mut mesh = Mesh::new(shader());
        assert!(mesh.set_verts(&[0.0, 1.0]).is_err());
        assert!(mesh.set_tris(&[0, 1], None, false).is_err());
        assert!(mesh.set_triangle(0, Triangle::UNSET).is_err());
    }

    #[test]
    fn test_attribute_counts_checked() {
        let mut mesh = quad();
        mesh.set_vertex_normals(&[0.0, 0.0, 1.0]).unwrap();
        assert!(mesh.validate().is_err());
        mesh.set_vertex_normals(&[0.0f32, 0.0, 1.0].repeat(4)).unwrap();
        assert!(mesh.validate().is_ok());

        mesh.request_tangent_space("uv");
        assert!(mesh.validate().is_err());
        mesh.set_uvs("uv", &[0.5; 12]).unwrap();
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_in_place_vertex_update() {
        let mut mesh = quad();
        mesh.clear_update_flags();
        assert!(mesh.verts_fit(12));
        mesh.set_verts(&[2.0; 12]).unwrap();
        assert!(mesh.is_dirty());
        assert!(!mesh.needs_rebuild());
    }
}
