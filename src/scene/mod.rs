//! Scene aggregate.
//!
//! A [`Scene`] owns its camera, settings blocks, clipping planes and four
//! scene-local arenas (meshes, objects, shaders, lights). Every sub-object
//! carries a dirty flag; the render worker only re-snapshots a scene when one
//! of them is set.
//!
//! Mutations come in three flavours:
//! - named setters (`*_mut`, `add_*`, `remove_*`) mark what they touch dirty;
//! - `edit_*` closures change plain fields without marking anything, so a
//!   client can batch edits;
//! - `tag_*` calls mark a sub-object dirty explicitly, flushing a batch.

mod camera;
mod clipping;
mod light;
mod mesh;
mod object;
mod settings;

pub use camera::{Camera, CameraKind, PanoramaKind, Ray, Viewplane};
pub use clipping::{ClippingPlane, ClippingPlanes};
pub use light::{Light, LightKind};
pub use mesh::{Mesh, Triangle, UNSET_INDEX};
pub use object::{mat4_from_rows, Object, RayVisibility};
pub use settings::{Background, FilterType, Film, Integrator, IntegratorMethod, SamplingPattern};

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::SlotMap;

use crate::error::{HostError, HostResult};
use crate::handle::{
    ArenaExt, HandleKind, LightId, MeshId, ObjectId, RawHandle, SessionId, ShaderId,
};
use crate::lock::SceneLock;
use crate::params::SceneParams;
use crate::shader::{Shader, ShaderNode, ShaderNodeKind};

/// Everything a render needs to describe what to draw.
#[derive(Debug, Clone)]
pub struct Scene {
    params: SceneParams,
    camera: Camera,
    integrator: Integrator,
    film: Film,
    background: Background,
    clipping: ClippingPlanes,
    meshes: SlotMap<MeshId, Mesh>,
    objects: SlotMap<ObjectId, Object>,
    shaders: SlotMap<ShaderId, Shader>,
    lights: SlotMap<LightId, Light>,
    default_surface: ShaderId,
    /// Set by structural changes that leave no per-object flag behind
    /// (removals, clipping planes) and by [`Scene::reset`].
    structure_dirty: bool,
    revision: u64,
}

/// Immutable copy of a scene taken by the render worker.
pub type SceneSnapshot = Arc<Scene>;

impl Scene {
    /// Creates an empty scene holding only the default surface shader.
    pub fn new(params: SceneParams) -> Self {
        let mut shaders = SlotMap::with_key();
        let default_surface = shaders.insert(Shader::default_surface());
        Self {
            params,
            camera: Camera::default(),
            integrator: Integrator::default(),
            film: Film::default(),
            background: Background::default(),
            clipping: ClippingPlanes::default(),
            meshes: SlotMap::with_key(),
            objects: SlotMap::with_key(),
            shaders,
            lights: SlotMap::with_key(),
            default_surface,
            structure_dirty: true,
            revision: 0,
        }
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    /// Number of snapshots taken so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // Dirty tracking.

    /// Whether anything changed since the last snapshot.
    pub fn is_dirty(&self) -> bool {
        self.structure_dirty
            || self.camera.dirty
            || self.integrator.dirty
            || self.film.dirty
            || self.background.dirty
            || self.meshes.values().any(|m| m.dirty)
            || self.objects.values().any(|o| o.dirty)
            || self.shaders.values().any(|s| s.dirty)
            || self.lights.values().any(|l| l.dirty)
    }

    /// Forces a full re-upload on the next snapshot.
    pub fn reset(&mut self) {
        self.structure_dirty = true;
        self.camera.dirty = true;
        self.integrator.dirty = true;
        self.film.dirty = true;
        self.background.dirty = true;
        self.meshes.values_mut().for_each(Mesh::tag_rebuild);
        self.objects.values_mut().for_each(Object::tag_update);
        self.shaders.values_mut().for_each(Shader::tag_update);
        self.lights.values_mut().for_each(Light::tag_update);
        log::debug!("Scene: reset, full re-upload scheduled");
    }

    fn clear_dirty(&mut self) {
        self.structure_dirty = false;
        self.camera.dirty = false;
        self.integrator.dirty = false;
        self.film.dirty = false;
        self.background.dirty = false;
        self.meshes.values_mut().for_each(Mesh::clear_update_flags);
        self.objects.values_mut().for_each(|o| o.dirty = false);
        self.shaders.values_mut().for_each(|s| s.dirty = false);
        self.lights.values_mut().for_each(|l| l.dirty = false);
    }

    /// Validates the scene and copies it for rendering, clearing every dirty
    /// flag. On validation failure nothing is cleared.
    pub fn snapshot(&mut self) -> HostResult<SceneSnapshot> {
        self.validate()?;
        self.revision += 1;
        let snapshot = Arc::new(self.clone());
        self.clear_dirty();
        log::trace!("Scene: snapshot revision {}", self.revision);
        Ok(snapshot)
    }

    /// Checks every cross reference and every mesh.
    pub fn validate(&self) -> HostResult<()> {
        let shader_ok = |id: ShaderId| self.shaders.contains_key(id);
        let context = |what: String| move |err: HostError| match err {
            HostError::Validation(msg) => HostError::Validation(format!("{what}: {msg}")),
            other => other,
        };

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(HostError::Validation(format!(
                "camera size {}x{} is empty",
                self.camera.width, self.camera.height
            )));
        }
        for (id, mesh) in &self.meshes {
            mesh.validate()
                .map_err(context(format!("mesh {:#x}", id.raw())))?;
            let bad_shader = std::iter::once(mesh.shader)
                .chain(mesh.triangles().iter().filter_map(|t| t.shader))
                .find(|s| !shader_ok(*s));
            if let Some(shader) = bad_shader {
                return Err(HostError::Validation(format!(
                    "mesh {:#x} uses destroyed shader {:#x}",
                    id.raw(),
                    shader.raw()
                )));
            }
        }
        for (id, object) in &self.objects {
            if let Some(mesh) = object.mesh {
                if !self.meshes.contains_key(mesh) {
                    return Err(HostError::Validation(format!(
                        "object {:#x} references destroyed mesh {:#x}",
                        id.raw(),
                        mesh.raw()
                    )));
                }
            }
            if let Some(shader) = object.shader.filter(|s| !shader_ok(*s)) {
                return Err(HostError::Validation(format!(
                    "object {:#x} uses destroyed shader {:#x}",
                    id.raw(),
                    shader.raw()
                )));
            }
        }
        for (id, light) in &self.lights {
            if !shader_ok(light.shader) {
                return Err(HostError::Validation(format!(
                    "light {:#x} uses destroyed shader {:#x}",
                    id.raw(),
                    light.shader.raw()
                )));
            }
        }
        if let Some(shader) = self.background.shader.filter(|s| !shader_ok(*s)) {
            return Err(HostError::Validation(format!(
                "background uses destroyed shader {:#x}",
                shader.raw()
            )));
        }
        Ok(())
    }

    // Settings blocks.

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Camera access for a named setter; marks the camera dirty.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.camera.dirty = true;
        &mut self.camera
    }

    /// Edits plain camera fields without marking the camera dirty.
    pub fn edit_camera<R>(&mut self, edit: impl FnOnce(&mut Camera) -> R) -> R {
        let dirty = self.camera.dirty;
        let result = edit(&mut self.camera);
        self.camera.dirty = dirty;
        result
    }

    pub fn tag_camera(&mut self) {
        self.camera.tag_update();
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn integrator_mut(&mut self) -> &mut Integrator {
        self.integrator.dirty = true;
        &mut self.integrator
    }

    pub fn edit_integrator<R>(&mut self, edit: impl FnOnce(&mut Integrator) -> R) -> R {
        let dirty = self.integrator.dirty;
        let result = edit(&mut self.integrator);
        self.integrator.dirty = dirty;
        result
    }

    pub fn tag_integrator(&mut self) {
        self.integrator.tag_update();
    }

    pub fn film(&self) -> &Film {
        &self.film
    }

    pub fn film_mut(&mut self) -> &mut Film {
        self.film.dirty = true;
        &mut self.film
    }

    pub fn edit_film<R>(&mut self, edit: impl FnOnce(&mut Film) -> R) -> R {
        let dirty = self.film.dirty;
        let result = edit(&mut self.film);
        self.film.dirty = dirty;
        result
    }

    pub fn tag_film(&mut self) {
        self.film.tag_update();
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut Background {
        self.background.dirty = true;
        &mut self.background
    }

    pub fn edit_background<R>(&mut self, edit: impl FnOnce(&mut Background) -> R) -> R {
        let dirty = self.background.dirty;
        let result = edit(&mut self.background);
        self.background.dirty = dirty;
        result
    }

    pub fn tag_background(&mut self) {
        self.background.tag_update();
    }

    /// Sets the world shader.
    pub fn set_background_shader(&mut self, shader: Option<ShaderId>) -> HostResult<()> {
        if let Some(id) = shader {
            self.shaders.lookup(HandleKind::Shader, id)?;
        }
        self.background_mut().shader = shader;
        Ok(())
    }

    // Clipping planes.

    pub fn clipping_planes(&self) -> &ClippingPlanes {
        &self.clipping
    }

    /// Clipping plane access; marks the scene structure dirty.
    pub fn clipping_planes_mut(&mut self) -> &mut ClippingPlanes {
        self.structure_dirty = true;
        &mut self.clipping
    }

    // Shaders.

    pub fn add_shader(&mut self, shader: Shader) -> ShaderId {
        self.shaders.insert(shader)
    }

    pub fn shader(&self, id: ShaderId) -> HostResult<&Shader> {
        self.shaders.lookup(HandleKind::Shader, id)
    }

    /// Shader access for a named setter; marks the shader dirty.
    pub fn shader_mut(&mut self, id: ShaderId) -> HostResult<&mut Shader> {
        let shader = self.shaders.lookup_mut(HandleKind::Shader, id)?;
        shader.dirty = true;
        Ok(shader)
    }

    pub fn edit_shader<R>(
        &mut self,
        id: ShaderId,
        edit: impl FnOnce(&mut Shader) -> R,
    ) -> HostResult<R> {
        let shader = self.shaders.lookup_mut(HandleKind::Shader, id)?;
        let dirty = shader.dirty;
        let result = edit(shader);
        shader.dirty = dirty;
        Ok(result)
    }

    /// Marks a shader as used (or unused) and dirty.
    pub fn tag_shader(&mut self, id: ShaderId, used: bool) -> HostResult<()> {
        self.shader_mut(id)?.used = used;
        Ok(())
    }

    pub fn tag_shader_update(&mut self, id: ShaderId) -> HostResult<()> {
        self.shader_mut(id).map(|_| ())
    }

    /// Adds a node to a shader graph.
    pub fn add_shader_node(&mut self, id: ShaderId, kind: ShaderNodeKind) -> HostResult<u32> {
        Ok(self.shader_mut(id)?.graph.add(kind))
    }

    /// Applies a fallible edit to one node. The shader is marked dirty only
    /// if the edit succeeds.
    pub fn edit_shader_node<R>(
        &mut self,
        id: ShaderId,
        node: u32,
        edit: impl FnOnce(&mut ShaderNode) -> HostResult<R>,
    ) -> HostResult<R> {
        let shader = self.shaders.lookup_mut(HandleKind::Shader, id)?;
        let result = edit(shader.graph.node_mut(node)?)?;
        shader.dirty = true;
        Ok(result)
    }

    pub fn connect_shader_nodes(
        &mut self,
        id: ShaderId,
        from: (u32, &str),
        to: (u32, &str),
    ) -> HostResult<()> {
        let shader = self.shaders.lookup_mut(HandleKind::Shader, id)?;
        shader.graph.connect(from.0, from.1, to.0, to.1)?;
        shader.dirty = true;
        Ok(())
    }

    pub fn default_surface(&self) -> ShaderId {
        self.default_surface
    }

    pub fn set_default_surface(&mut self, id: ShaderId) -> HostResult<()> {
        self.shaders.lookup(HandleKind::Shader, id)?;
        self.default_surface = id;
        self.structure_dirty = true;
        Ok(())
    }

    /// Removes a shader. The default surface shader cannot be removed.
    pub fn remove_shader(&mut self, id: ShaderId) -> HostResult<Shader> {
        if id == self.default_surface {
            return Err(HostError::ScenePrecondition {
                operation: "remove_shader",
                reason: "the default surface shader cannot be removed".to_string(),
            });
        }
        let shader = self
            .shaders
            .remove(id)
            .ok_or(HostError::invalid(HandleKind::Shader, id.raw()))?;
        self.structure_dirty = true;
        Ok(shader)
    }

    pub fn shaders(&self) -> impl Iterator<Item = (ShaderId, &Shader)> {
        self.shaders.iter()
    }

    // Meshes.

    /// Adds an empty mesh using `shader`.
    pub fn add_mesh(&mut self, shader: ShaderId) -> HostResult<MeshId> {
        self.shaders.lookup(HandleKind::Shader, shader)?;
        Ok(self.meshes.insert(Mesh::new(shader)))
    }

    /// Adds an empty mesh and assigns it to `object`.
    pub fn add_mesh_object(&mut self, object: ObjectId, shader: ShaderId) -> HostResult<MeshId> {
        self.objects.lookup(HandleKind::Object, object)?;
        let mesh = self.add_mesh(shader)?;
        self.object_mut(object)?.mesh = Some(mesh);
        Ok(mesh)
    }

    pub fn mesh(&self, id: MeshId) -> HostResult<&Mesh> {
        self.meshes.lookup(HandleKind::Mesh, id)
    }

    /// Mesh access. Mesh setters mark the mesh dirty themselves.
    pub fn mesh_mut(&mut self, id: MeshId) -> HostResult<&mut Mesh> {
        self.meshes.lookup_mut(HandleKind::Mesh, id)
    }

    /// Sets the mesh shader, checking that it exists.
    pub fn set_mesh_shader(&mut self, id: MeshId, shader: ShaderId) -> HostResult<()> {
        self.shaders.lookup(HandleKind::Shader, shader)?;
        let mesh = self.mesh_mut(id)?;
        mesh.shader = shader;
        mesh.dirty = true;
        Ok(())
    }

    /// Removes a mesh and detaches it from every object using it.
    pub fn remove_mesh(&mut self, id: MeshId) -> HostResult<Mesh> {
        let mesh = self
            .meshes
            .remove(id)
            .ok_or(HostError::invalid(HandleKind::Mesh, id.raw()))?;
        for object in self.objects.values_mut().filter(|o| o.mesh == Some(id)) {
            object.mesh = None;
            object.dirty = true;
        }
        self.structure_dirty = true;
        Ok(mesh)
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter()
    }

    // Objects.

    pub fn add_object(&mut self) -> ObjectId {
        self.objects.insert(Object::new())
    }

    pub fn object(&self, id: ObjectId) -> HostResult<&Object> {
        self.objects.lookup(HandleKind::Object, id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> HostResult<&mut Object> {
        let object = self.objects.lookup_mut(HandleKind::Object, id)?;
        object.dirty = true;
        Ok(object)
    }

    pub fn edit_object<R>(
        &mut self,
        id: ObjectId,
        edit: impl FnOnce(&mut Object) -> R,
    ) -> HostResult<R> {
        let object = self.objects.lookup_mut(HandleKind::Object, id)?;
        let dirty = object.dirty;
        let result = edit(object);
        object.dirty = dirty;
        Ok(result)
    }

    pub fn tag_object(&mut self, id: ObjectId) -> HostResult<()> {
        self.object_mut(id).map(|_| ())
    }

    pub fn set_object_mesh(&mut self, id: ObjectId, mesh: MeshId) -> HostResult<()> {
        self.meshes.lookup(HandleKind::Mesh, mesh)?;
        self.object_mut(id)?.mesh = Some(mesh);
        Ok(())
    }

    pub fn set_object_shader(&mut self, id: ObjectId, shader: ShaderId) -> HostResult<()> {
        self.shaders.lookup(HandleKind::Shader, shader)?;
        self.object_mut(id)?.shader = Some(shader);
        Ok(())
    }

    pub fn remove_object(&mut self, id: ObjectId) -> HostResult<Object> {
        let object = self
            .objects
            .remove(id)
            .ok_or(HostError::invalid(HandleKind::Object, id.raw()))?;
        self.structure_dirty = true;
        Ok(object)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter()
    }

    // Lights.

    pub fn add_light(&mut self, shader: ShaderId) -> HostResult<LightId> {
        self.shaders.lookup(HandleKind::Shader, shader)?;
        Ok(self.lights.insert(Light::new(shader)))
    }

    pub fn light(&self, id: LightId) -> HostResult<&Light> {
        self.lights.lookup(HandleKind::Light, id)
    }

    pub fn light_mut(&mut self, id: LightId) -> HostResult<&mut Light> {
        let light = self.lights.lookup_mut(HandleKind::Light, id)?;
        light.dirty = true;
        Ok(light)
    }

    pub fn edit_light<R>(
        &mut self,
        id: LightId,
        edit: impl FnOnce(&mut Light) -> R,
    ) -> HostResult<R> {
        let light = self.lights.lookup_mut(HandleKind::Light, id)?;
        let dirty = light.dirty;
        let result = edit(light);
        light.dirty = dirty;
        Ok(result)
    }

    pub fn tag_light(&mut self, id: LightId) -> HostResult<()> {
        self.light_mut(id).map(|_| ())
    }

    pub fn remove_light(&mut self, id: LightId) -> HostResult<Light> {
        let light = self
            .lights
            .remove(id)
            .ok_or(HostError::invalid(HandleKind::Light, id.raw()))?;
        self.structure_dirty = true;
        Ok(light)
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter()
    }
}

/// A scene as registered with the host: the scene itself, its lock and the
/// session it is attached to.
///
/// Structural edits go through [`SharedScene::structural`], which holds the
/// scene lock unless the calling thread already does. Attribute edits only
/// take the inner mutex.
#[derive(Debug)]
pub struct SharedScene {
    lock: SceneLock,
    scene: Mutex<Scene>,
    session: Mutex<Option<SessionId>>,
}

impl SharedScene {
    pub fn new(scene: Scene) -> Self {
        Self {
            lock: SceneLock::new(),
            scene: Mutex::new(scene),
            session: Mutex::new(None),
        }
    }

    pub fn lock(&self) -> &SceneLock {
        &self.lock
    }

    /// Applies a structural edit under the scene lock.
    pub fn structural<R>(&self, edit: impl FnOnce(&mut Scene) -> HostResult<R>) -> HostResult<R> {
        let _guard = self.lock.scoped()?;
        edit(&mut self.scene.lock())
    }

    /// Applies an attribute edit.
    pub fn edit<R>(&self, edit: impl FnOnce(&mut Scene) -> R) -> R {
        edit(&mut self.scene.lock())
    }

    pub fn read<R>(&self, read: impl FnOnce(&Scene) -> R) -> R {
        read(&self.scene.lock())
    }

    /// Session the scene is attached to.
    pub fn session(&self) -> Option<SessionId> {
        *self.session.lock()
    }

    pub(crate) fn set_session(&self, session: Option<SessionId>) {
        *self.session.lock() = session;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn triangle_scene() -> (Scene, ObjectId, MeshId) {
        let mut scene = Scene::new(SceneParams::default());
        let object = scene.add_object();
        let mesh = scene
            .add_mesh_object(object, scene.default_surface())
            .unwrap();
        let m = scene.mesh_mut(mesh).unwrap();
        m.set_verts(&[0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0])
            .unwrap();
        m.set_tris(&[0, 1, 2], None, false).unwrap();
        (scene, object, mesh)
    }

    #[test]
    fn test_snapshot_clears_dirty() {
        let (mut scene, _, _) = triangle_scene();
        assert!(scene.is_dirty());
        let snapshot = scene.snapshot().unwrap();
        assert!(!scene.is_dirty());
        assert_eq!(scene.revision(), 1);
        assert_eq!(snapshot.objects().count(), 1);
    }

    #[test]
    fn test_edit_does_not_mark_dirty_but_tag_does() {
        let (mut scene, object, _) = triangle_scene();
        scene.snapshot().unwrap();

        scene
            .edit_object(object, |o| o.pass_id = 4)
            .unwrap();
        scene.edit_integrator(|i| i.seed = 9);
        assert!(!scene.is_dirty());

        scene.tag_object(object).unwrap();
        assert!(scene.is_dirty());
        scene.snapshot().unwrap();

        scene.edit_camera(|c| c.set_size(10, 10));
        assert!(!scene.is_dirty());
        scene.tag_camera();
        assert!(scene.is_dirty());
    }

    #[test]
    fn test_invalid_mesh_blocks_snapshot() {
        let (mut scene, _, mesh) = triangle_scene();
        scene.mesh_mut(mesh).unwrap().resize(2, 1);
        let err = scene.snapshot().unwrap_err();
        assert!(matches!(err, HostError::Validation(msg) if msg.contains("triangle 0")));
        assert!(scene.is_dirty());
        assert_eq!(scene.revision(), 0);
    }

    #[test]
    fn test_remove_mesh_detaches_objects() {
        let (mut scene, object, mesh) = triangle_scene();
        scene.remove_mesh(mesh).unwrap();
        assert_eq!(scene.object(object).unwrap().mesh, None);
        assert!(scene.mesh(mesh).is_err());
    }

    #[test]
    fn test_destroyed_shader_fails_validation() {
        let (mut scene, object, _) = triangle_scene();
        let shader = scene.add_shader(Shader::new());
        scene.set_object_shader(object, shader).unwrap();
        scene.remove_shader(shader).unwrap();
        assert!(matches!(scene.validate(), Err(HostError::Validation(_))));

        let default = scene.default_surface();
        assert!(matches!(
            scene.remove_shader(default),
            Err(HostError::ScenePrecondition { .. })
        ));
    }

    #[test]
    fn test_failed_node_edit_keeps_shader_clean() {
        let mut scene = Scene::new(SceneParams::default());
        let shader = scene.add_shader(Shader::new());
        let node = scene.add_shader_node(shader, ShaderNodeKind::Math).unwrap();
        scene.snapshot().unwrap();

        let result = scene.edit_shader_node(shader, node, |n| {
            n.set_enum(ShaderNodeKind::Mix, "type", 1)
        });
        assert!(matches!(result, Err(HostError::TypeMismatch { .. })));
        assert!(!scene.is_dirty());
    }

    #[test]
    fn test_reset_forces_full_upload() {
        let (mut scene, _, mesh) = triangle_scene();
        scene.snapshot().unwrap();
        scene.reset();
        assert!(scene.is_dirty());
        assert!(scene.mesh(mesh).unwrap().needs_rebuild());
    }

    #[test]
    fn test_structural_edit_respects_held_lock() {
        let shared = SharedScene::new(Scene::new(SceneParams::default()));
        let object = shared.structural(|s| Ok(s.add_object())).unwrap();
        assert!(!shared.lock().is_locked());

        shared.lock().lock().unwrap();
        shared.structural(|s| s.remove_object(object)).unwrap();
        assert!(shared.lock().is_held_by_current_thread());
        shared.lock().unlock().unwrap();
        assert_eq!(shared.read(|s| s.objects().count()), 0);
    }

    #[test]
    fn test_clipping_marks_dirty() {
        let (mut scene, _, _) = triangle_scene();
        scene.snapshot().unwrap();
        scene.clipping_planes_mut().add(Vec4::Z);
        assert!(scene.is_dirty());
    }
}
