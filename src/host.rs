//! The boundary facade.
//!
//! [`RenderHost`] is what clients talk to. Every operation takes the calling
//! [`ClientId`] plus typed handles, resolves them through the registries and
//! forwards to the scene, session or device layer. Failures are returned as
//! [`HostError`] and also routed to the client's logger sink; callers that
//! want the sentinel contract use [`Sentinel`](crate::Sentinel).
//!
//! Handles are scoped per client: a handle created by one client is invalid
//! for every other client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glam::{Vec3, Vec4};
use parking_lot::RwLock;

use crate::callback::{CancelCallback, DisplayCallback, StatusCallback, TileCallback};
use crate::client::{ClientRegistry, OwnedHandle};
use crate::config::{DebugFlags, HostConfig};
use crate::device::{DeviceInfo, DeviceKind, DeviceMask, DeviceRegistry};
use crate::engine::{PreviewEngine, RenderEngine};
use crate::error::{HostError, HostResult};
use crate::handle::{
    ClientId, HandleKind, LightId, MeshId, ObjectId, RawHandle, Registry, SceneId,
    SceneParamsId, SessionId, SessionParamsId, ShaderId,
};
use crate::logging::{LogRouter, LoggerSink};
use crate::params::{SceneParams, SessionParams};
use crate::scene::{
    mat4_from_rows, Background, Camera, Film, Integrator, Light, Mesh, Object, Scene,
    SharedScene, Triangle,
};
use crate::session::{BufferInfo, BufferParams, PassType, SampleStatus, Session, SessionState};
use crate::shader::{Shader, ShaderNode, ShaderNodeKind};
use crate::strings::StringHolder;

/// Shared front end over one render engine.
pub struct RenderHost {
    config: RwLock<HostConfig>,
    log: LogRouter,
    engine: Arc<dyn RenderEngine>,
    clients: ClientRegistry,
    devices: DeviceRegistry,
    scene_params: Registry<SceneParamsId, RwLock<SceneParams>>,
    session_params: Registry<SessionParamsId, RwLock<SessionParams>>,
    scenes: Registry<SceneId, Arc<SharedScene>>,
    sessions: Registry<SessionId, Session>,
}

impl RenderHost {
    /// Creates a host over `engine`. This is the process init point.
    pub fn new(config: HostConfig, engine: Arc<dyn RenderEngine>) -> Self {
        let devices = DeviceRegistry::new(engine.devices(), config.device_mask);
        log::info!("RenderHost: initialised with {}", engine.name());
        Self {
            log: LogRouter::new(config.log_to_stdout),
            config: RwLock::new(config),
            engine,
            clients: ClientRegistry::new(),
            devices,
            scene_params: Registry::new(HandleKind::SceneParams),
            session_params: Registry::new(HandleKind::SessionParams),
            scenes: Registry::new(HandleKind::Scene),
            sessions: Registry::new(HandleKind::Session),
        }
    }

    /// Creates a host over the built-in [`PreviewEngine`].
    pub fn preview(config: HostConfig) -> Self {
        Self::new(config, Arc::new(PreviewEngine::new()))
    }

    /// Routes a failed result to the client's sink and the log facade.
    fn report<T>(&self, client: ClientId, operation: &str, result: HostResult<T>) -> HostResult<T> {
        if let Err(err) = &result {
            let level = match err {
                HostError::UsageWarning(_) => log::Level::Warn,
                _ => log::Level::Error,
            };
            let sink = self.clients.logger(client);
            self.log
                .route(client, sink.as_ref(), level, &format!("{operation}: {err}"));
        }
        result
    }

    fn require_client(&self, client: ClientId) -> HostResult<()> {
        if self.clients.contains(client) {
            Ok(())
        } else {
            Err(HostError::invalid(HandleKind::Client, u64::from(client.0)))
        }
    }

    // Process lifecycle.

    /// Re-enumerates devices, keeping only kinds allowed by `mask`.
    /// Multi-devices created earlier are forgotten.
    pub fn initialise(&self, mask: DeviceMask) {
        self.config.write().device_mask = mask;
        self.devices.reset(self.engine.devices(), mask);
    }

    pub fn path_init(&self, install_path: impl Into<PathBuf>, user_path: impl Into<PathBuf>) {
        let mut config = self.config.write();
        config.install_path = Some(install_path.into());
        config.user_path = Some(user_path.into());
    }

    /// Adds an environment override for the engine.
    pub fn putenv(&self, variable: &str, value: &str) {
        self.config
            .write()
            .environment
            .insert(variable.to_string(), value.to_string());
    }

    pub fn set_log_to_stdout(&self, enabled: bool) {
        self.config.write().log_to_stdout = enabled;
        self.log.set_mirror_to_stdout(enabled);
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.config.read().debug
    }

    /// Changes the kernel selection toggles.
    pub fn edit_debug_flags(&self, edit: impl FnOnce(&mut DebugFlags)) {
        edit(&mut self.config.write().debug);
    }

    /// Copy of the current configuration.
    pub fn config(&self) -> HostConfig {
        self.config.read().clone()
    }

    pub fn engine(&self) -> &Arc<dyn RenderEngine> {
        &self.engine
    }

    /// Teardown: cancels and joins every session, then clears every
    /// registry. Handles minted before the call are invalid afterwards.
    pub fn shutdown(&self) {
        let sessions = self.sessions.drain();
        for session in &sessions {
            session.destroy();
        }
        let scenes = self.scenes.drain();
        self.scene_params.drain();
        self.session_params.drain();
        self.clients.clear();
        log::info!(
            "RenderHost: shut down ({} session(s), {} scene(s) released)",
            sessions.len(),
            scenes.len()
        );
    }

    // Clients.

    pub fn new_client(&self) -> ClientId {
        self.clients.create()
    }

    /// Releases `client`.
    ///
    /// Releasing with live sessions or scenes fails with
    /// [`HostError::UsageWarning`]; the client is released anyway and the
    /// leftovers stay alive until destroyed with the old client ID.
    pub fn release_client(&self, client: ClientId) -> HostResult<()> {
        let sink = self.clients.logger(client);
        let result = self.clients.release(client).map_err(|err| match err {
            HostError::UsageWarning(message) => HostError::UsageWarning(format!(
                "{message} (sessions [{}], scenes [{}])",
                raw_list(self.sessions.keys_owned_by(client)),
                raw_list(self.scenes.keys_owned_by(client)),
            )),
            err => err,
        });
        if let Err(err) = &result {
            self.log
                .route(client, sink.as_ref(), log::Level::Warn, &format!("release_client: {err}"));
        }
        result
    }

    pub fn set_logger(&self, client: ClientId, sink: Option<LoggerSink>) -> HostResult<()> {
        let result = self.clients.set_logger(client, sink);
        self.report(client, "set_logger", result)
    }

    // Devices.

    pub fn device_count(&self) -> u32 {
        self.devices.count()
    }

    pub fn multidevice_count(&self) -> u32 {
        self.devices.multi_count()
    }

    pub fn cuda_device_count(&self) -> u32 {
        self.devices.cuda_count()
    }

    pub fn multi_subdevice_count(&self, multi_index: u32) -> HostResult<u32> {
        self.devices.multi_member_count(multi_index)
    }

    pub fn multidevice_subdevice_id(&self, multi_index: u32, member: u32) -> HostResult<u32> {
        self.devices.multi_member(multi_index, member)
    }

    pub fn device(&self, id: u32) -> HostResult<DeviceInfo> {
        self.devices.get(id)
    }

    pub fn device_description(&self, id: u32) -> HostResult<String> {
        self.devices.get(id).map(|d| d.description)
    }

    pub fn device_id(&self, id: u32) -> HostResult<String> {
        self.devices.get(id).map(|d| d.id)
    }

    pub fn device_num(&self, id: u32) -> HostResult<u32> {
        self.devices.get(id).map(|d| d.num)
    }

    pub fn device_type(&self, id: u32) -> HostResult<DeviceKind> {
        self.devices.get(id).map(|d| d.kind)
    }

    pub fn device_advanced_shading(&self, id: u32) -> HostResult<bool> {
        self.devices.get(id).map(|d| d.advanced_shading())
    }

    pub fn device_display_device(&self, id: u32) -> HostResult<bool> {
        self.devices.get(id).map(|d| d.display_device())
    }

    pub fn device_pack_images(&self, id: u32) -> HostResult<bool> {
        self.devices.get(id).map(|d| d.pack_images())
    }

    pub fn device_capabilities(&self) -> String {
        self.devices.capabilities_report()
    }

    /// Device ID of the multi-device made of `members`. Repeated requests
    /// for the same member set return the same ID.
    pub fn create_multidevice(&self, members: &[u32]) -> HostResult<u32> {
        self.devices.create_multi(members)
    }

    // Params blocks.

    pub fn scene_params_create(
        &self,
        client: ClientId,
        params: SceneParams,
    ) -> HostResult<SceneParamsId> {
        let result = self.require_client(client).map(|()| {
            let id = self.scene_params.insert(client, RwLock::new(params));
            self.clients.track(client, OwnedHandle::SceneParams(id));
            id
        });
        self.report(client, "scene_params_create", result)
    }

    pub fn scene_params(&self, client: ClientId, id: SceneParamsId) -> HostResult<SceneParams> {
        let result = self.scene_params.get_owned(client, id).map(|p| p.read().clone());
        self.report(client, "scene_params", result)
    }

    /// Changes a params block. Scenes created from it earlier keep the values
    /// they were created with.
    pub fn scene_params_edit(
        &self,
        client: ClientId,
        id: SceneParamsId,
        edit: impl FnOnce(&mut SceneParams),
    ) -> HostResult<()> {
        let result = self
            .scene_params
            .get_owned(client, id)
            .map(|p| edit(&mut p.write()));
        self.report(client, "scene_params_edit", result)
    }

    pub fn scene_params_destroy(&self, client: ClientId, id: SceneParamsId) -> HostResult<()> {
        let result = self.scene_params.remove(client, id).map(|_| {
            self.clients.untrack(client, OwnedHandle::SceneParams(id));
        });
        self.report(client, "scene_params_destroy", result)
    }

    pub fn session_params_create(
        &self,
        client: ClientId,
        params: SessionParams,
    ) -> HostResult<SessionParamsId> {
        let result = self.require_client(client).map(|()| {
            let id = self.session_params.insert(client, RwLock::new(params));
            self.clients.track(client, OwnedHandle::SessionParams(id));
            id
        });
        self.report(client, "session_params_create", result)
    }

    pub fn session_params(
        &self,
        client: ClientId,
        id: SessionParamsId,
    ) -> HostResult<SessionParams> {
        let result = self
            .session_params
            .get_owned(client, id)
            .map(|p| p.read().clone());
        self.report(client, "session_params", result)
    }

    pub fn session_params_edit(
        &self,
        client: ClientId,
        id: SessionParamsId,
        edit: impl FnOnce(&mut SessionParams),
    ) -> HostResult<()> {
        let result = self
            .session_params
            .get_owned(client, id)
            .map(|p| edit(&mut p.write()));
        self.report(client, "session_params_edit", result)
    }

    pub fn session_params_destroy(&self, client: ClientId, id: SessionParamsId) -> HostResult<()> {
        let result = self.session_params.remove(client, id).map(|_| {
            self.clients.untrack(client, OwnedHandle::SessionParams(id));
        });
        self.report(client, "session_params_destroy", result)
    }

    // Scenes.

    fn scene_ref(&self, client: ClientId, id: SceneId) -> HostResult<Arc<SharedScene>> {
        self.scenes
            .get_owned(client, id)
            .map(|entry| Arc::clone(&entry.value))
    }

    fn with_scene<R>(
        &self,
        client: ClientId,
        id: SceneId,
        operation: &str,
        call: impl FnOnce(&SharedScene) -> HostResult<R>,
    ) -> HostResult<R> {
        let result = self.scene_ref(client, id).and_then(|scene| call(&scene));
        self.report(client, operation, result)
    }

    /// Attribute edit: takes only the scene's inner mutex.
    fn edit_scene<R>(
        &self,
        client: ClientId,
        id: SceneId,
        operation: &str,
        edit: impl FnOnce(&mut Scene) -> HostResult<R>,
    ) -> HostResult<R> {
        self.with_scene(client, id, operation, |scene| scene.edit(edit))
    }

    /// Structural edit: runs under the scene lock.
    fn structural_scene<R>(
        &self,
        client: ClientId,
        id: SceneId,
        operation: &str,
        edit: impl FnOnce(&mut Scene) -> HostResult<R>,
    ) -> HostResult<R> {
        self.with_scene(client, id, operation, |scene| scene.structural(edit))
    }

    /// Creates a scene from a params block.
    pub fn scene_create(&self, client: ClientId, params: SceneParamsId) -> HostResult<SceneId> {
        let result = self.require_client(client).and_then(|()| {
            let params = self.scene_params.get_owned(client, params)?.read().clone();
            let id = self
                .scenes
                .insert(client, Arc::new(SharedScene::new(Scene::new(params))));
            self.clients.track(client, OwnedHandle::Scene(id));
            Ok(id)
        });
        self.report(client, "scene_create", result)
    }

    /// Destroys a scene, detaching it from its session first. Fails while
    /// that session is running.
    pub fn scene_destroy(&self, client: ClientId, id: SceneId) -> HostResult<()> {
        let result = self.scene_ref(client, id).and_then(|scene| {
            if let Some(session) = scene.session().and_then(|s| self.sessions.get(s).ok()) {
                if session.state().is_running() {
                    return Err(HostError::ScenePrecondition {
                        operation: "scene_destroy",
                        reason: format!(
                            "the scene is being rendered by session {:#x}",
                            session.id().raw()
                        ),
                    });
                }
                session.detach_scene()?;
            }
            self.scenes.remove(client, id)?;
            self.clients.untrack(client, OwnedHandle::Scene(id));
            Ok(())
        });
        self.report(client, "scene_destroy", result)
    }

    /// Forces a full re-upload of the scene on the next snapshot.
    pub fn scene_reset(&self, client: ClientId, id: SceneId) -> HostResult<()> {
        self.structural_scene(client, id, "scene_reset", |scene| {
            scene.reset();
            Ok(())
        })
    }

    /// Runs `read` against the scene.
    pub fn scene_read<R>(
        &self,
        client: ClientId,
        id: SceneId,
        read: impl FnOnce(&Scene) -> R,
    ) -> HostResult<R> {
        self.with_scene(client, id, "scene_read", |scene| Ok(scene.read(read)))
    }

    /// Attribute edit on an already allocated part of the scene.
    pub fn scene_edit<R>(
        &self,
        client: ClientId,
        id: SceneId,
        edit: impl FnOnce(&mut Scene) -> HostResult<R>,
    ) -> HostResult<R> {
        self.edit_scene(client, id, "scene_edit", edit)
    }

    /// Structural edit under the scene lock.
    pub fn scene_structural<R>(
        &self,
        client: ClientId,
        id: SceneId,
        edit: impl FnOnce(&mut Scene) -> HostResult<R>,
    ) -> HostResult<R> {
        self.structural_scene(client, id, "scene_structural", edit)
    }

    // Scene lock.

    /// Acquires the scene lock without blocking. `false` means contention
    /// (or an invalid handle, which is also reported).
    pub fn scene_try_lock(&self, client: ClientId, id: SceneId) -> bool {
        self.with_scene(client, id, "scene_try_lock", |scene| Ok(scene.lock().try_lock()))
            .unwrap_or(false)
    }

    /// Blocks until the scene lock is acquired.
    pub fn scene_lock(&self, client: ClientId, id: SceneId) -> HostResult<()> {
        self.with_scene(client, id, "scene_lock", |scene| scene.lock().lock())
    }

    pub fn scene_unlock(&self, client: ClientId, id: SceneId) -> HostResult<()> {
        self.with_scene(client, id, "scene_unlock", |scene| scene.lock().unlock())
    }

    // Meshes.

    /// Adds a mesh using `shader`, or the scene's default surface.
    pub fn mesh_add(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: Option<ShaderId>,
    ) -> HostResult<MeshId> {
        self.structural_scene(client, scene, "mesh_add", |s| {
            let shader = shader.unwrap_or_else(|| s.default_surface());
            s.add_mesh(shader)
        })
    }

    /// Sets vertex positions from packed xyz floats. Growing the vertex
    /// count is structural.
    pub fn mesh_set_verts(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        coords: &[f32],
    ) -> HostResult<()> {
        let fits = self.edit_scene(client, scene, "mesh_set_verts", |s| {
            let m = s.mesh_mut(mesh)?;
            if m.verts_fit(coords.len()) {
                m.set_verts(coords).map(|()| true)
            } else {
                Ok(false)
            }
        })?;
        if fits {
            return Ok(());
        }
        self.structural_scene(client, scene, "mesh_set_verts", |s| {
            s.mesh_mut(mesh)?.set_verts(coords)
        })
    }

    /// Replaces the triangle list from packed vertex index triples.
    pub fn mesh_set_tris(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        faces: &[u32],
        shader: Option<ShaderId>,
        smooth: bool,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "mesh_set_tris", |s| {
            s.mesh_mut(mesh)?.set_tris(faces, shader, smooth)
        })
    }

    /// Overwrites one allocated triangle slot.
    pub fn mesh_set_triangle(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        index: usize,
        triangle: Triangle,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_set_triangle", |s| {
            s.mesh_mut(mesh)?.set_triangle(index, triangle)
        })
    }

    pub fn mesh_add_triangle(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        triangle: Triangle,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "mesh_add_triangle", |s| {
            s.mesh_mut(mesh)?.add_triangle(triangle);
            Ok(())
        })
    }

    /// Sets a named UV map from packed uv floats, one pair per triangle
    /// corner.
    pub fn mesh_set_uvs(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        name: &str,
        uvs: &[f32],
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_set_uvs", |s| {
            s.mesh_mut(mesh)?.set_uvs(name, uvs)
        })
    }

    pub fn mesh_set_vertex_normals(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        normals: &[f32],
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_set_vertex_normals", |s| {
            s.mesh_mut(mesh)?.set_vertex_normals(normals)
        })
    }

    pub fn mesh_set_vertex_colors(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        colors: &[f32],
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_set_vertex_colors", |s| {
            s.mesh_mut(mesh)?.set_vertex_colors(colors)
        })
    }

    pub fn mesh_set_smooth(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        smooth: bool,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_set_smooth", |s| {
            s.mesh_mut(mesh)?.set_smooth(smooth);
            Ok(())
        })
    }

    pub fn mesh_clear(&self, client: ClientId, scene: SceneId, mesh: MeshId) -> HostResult<()> {
        self.structural_scene(client, scene, "mesh_clear", |s| {
            s.mesh_mut(mesh)?.clear();
            Ok(())
        })
    }

    pub fn mesh_reserve(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        verts: usize,
        triangles: usize,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "mesh_reserve", |s| {
            s.mesh_mut(mesh)?.reserve(verts, triangles);
            Ok(())
        })
    }

    /// Resizes the vertex and triangle arrays. Slots past the old bounds are
    /// unset and must be filled before the next render.
    pub fn mesh_resize(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        verts: usize,
        triangles: usize,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "mesh_resize", |s| {
            s.mesh_mut(mesh)?.resize(verts, triangles);
            Ok(())
        })
    }

    pub fn mesh_tag_rebuild(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_tag_rebuild", |s| {
            s.mesh_mut(mesh)?.tag_rebuild();
            Ok(())
        })
    }

    pub fn mesh_set_shader(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        shader: ShaderId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_set_shader", |s| {
            s.set_mesh_shader(mesh, shader)
        })
    }

    /// Requests a tangent-space attribute generated from UV map `uv_map`.
    pub fn mesh_attr_tangentspace(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        uv_map: &str,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "mesh_attr_tangentspace", |s| {
            s.mesh_mut(mesh)?.request_tangent_space(uv_map);
            Ok(())
        })
    }

    pub fn mesh_remove(&self, client: ClientId, scene: SceneId, mesh: MeshId) -> HostResult<()> {
        self.structural_scene(client, scene, "mesh_remove", |s| {
            s.remove_mesh(mesh).map(drop)
        })
    }

    /// Runs `read` against one mesh.
    pub fn mesh_read<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        mesh: MeshId,
        read: impl FnOnce(&Mesh) -> R,
    ) -> HostResult<R> {
        self.with_scene(client, scene, "mesh_read", |s| {
            s.read(|s| s.mesh(mesh).map(read))
        })
    }

    // Objects.

    pub fn object_add(&self, client: ClientId, scene: SceneId) -> HostResult<ObjectId> {
        self.structural_scene(client, scene, "object_add", |s| Ok(s.add_object()))
    }

    /// Creates a mesh and attaches it to `object`.
    pub fn object_add_mesh(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
        shader: Option<ShaderId>,
    ) -> HostResult<MeshId> {
        self.structural_scene(client, scene, "object_add_mesh", |s| {
            let shader = shader.unwrap_or_else(|| s.default_surface());
            s.add_mesh_object(object, shader)
        })
    }

    /// Sets the object transform from 16 row-major floats.
    pub fn object_set_matrix(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
        rows: &[f32; 16],
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "object_set_matrix", |s| {
            s.object_mut(object)?.transform = mat4_from_rows(rows);
            Ok(())
        })
    }

    pub fn object_set_ocs_frame(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
        rows: &[f32; 16],
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "object_set_ocs_frame", |s| {
            s.object_mut(object)?.ocs_frame = mat4_from_rows(rows);
            Ok(())
        })
    }

    pub fn object_set_mesh(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
        mesh: MeshId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "object_set_mesh", |s| {
            s.set_object_mesh(object, mesh)
        })
    }

    pub fn object_mesh(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
    ) -> HostResult<Option<MeshId>> {
        self.with_scene(client, scene, "object_mesh", |s| {
            s.read(|s| s.object(object).map(|o| o.mesh))
        })
    }

    pub fn object_set_shader(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
        shader: ShaderId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "object_set_shader", |s| {
            s.set_object_shader(object, shader)
        })
    }

    /// Edits plain object fields without marking the object dirty; follow
    /// with [`object_tag_update`](Self::object_tag_update).
    pub fn object_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
        edit: impl FnOnce(&mut Object) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "object_edit", |s| s.edit_object(object, edit))
    }

    pub fn object_tag_update(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "object_tag_update", |s| s.tag_object(object))
    }

    pub fn object_remove(
        &self,
        client: ClientId,
        scene: SceneId,
        object: ObjectId,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "object_remove", |s| {
            s.remove_object(object).map(drop)
        })
    }

    // Shaders.

    pub fn shader_create(&self, client: ClientId, scene: SceneId) -> HostResult<ShaderId> {
        self.structural_scene(client, scene, "shader_create", |s| {
            Ok(s.add_shader(Shader::new()))
        })
    }

    pub fn scene_default_surface(&self, client: ClientId, scene: SceneId) -> HostResult<ShaderId> {
        self.with_scene(client, scene, "scene_default_surface", |s| {
            Ok(s.read(Scene::default_surface))
        })
    }

    pub fn scene_set_default_surface(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "scene_set_default_surface", |s| {
            s.set_default_surface(shader)
        })
    }

    /// Adds a node of `kind`, returning its shader-local ID.
    pub fn shader_add_node(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        kind: ShaderNodeKind,
    ) -> HostResult<u32> {
        self.structural_scene(client, scene, "shader_add_node", |s| {
            s.add_shader_node(shader, kind)
        })
    }

    /// Applies a fallible node edit. The shader is only marked dirty if the
    /// edit succeeds.
    pub fn shader_node_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        node: u32,
        edit: impl FnOnce(&mut ShaderNode) -> HostResult<R>,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "shader_node_edit", |s| {
            s.edit_shader_node(shader, node, edit)
        })
    }

    pub fn shader_node_set_attribute_float(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        node: u32,
        name: &str,
        value: f32,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_node_set_attribute_float", |s| {
            s.edit_shader_node(shader, node, |n| n.set_attribute_float(name, value))
        })
    }

    pub fn shader_node_set_attribute_int(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        node: u32,
        name: &str,
        value: i32,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_node_set_attribute_int", |s| {
            s.edit_shader_node(shader, node, |n| n.set_attribute_int(name, value))
        })
    }

    pub fn shader_node_set_attribute_vec(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        node: u32,
        name: &str,
        value: Vec3,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_node_set_attribute_vec", |s| {
            s.edit_shader_node(shader, node, |n| n.set_attribute_vec(name, value))
        })
    }

    pub fn shader_node_set_attribute_string(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        node: u32,
        name: &str,
        value: &str,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_node_set_attribute_string", |s| {
            s.edit_shader_node(shader, node, |n| n.set_attribute_string(name, value))
        })
    }

    /// Sets an enum member. `kind` must match the node's kind.
    pub fn shader_node_set_enum(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        node: u32,
        kind: ShaderNodeKind,
        name: &str,
        value: i32,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_node_set_enum", |s| {
            s.edit_shader_node(shader, node, |n| n.set_enum(kind, name, value))
        })
    }

    /// Links output socket `from` of node `from_node` into input `to` of
    /// `to_node`.
    pub fn shader_connect_nodes(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        from: (u32, &str),
        to: (u32, &str),
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "shader_connect_nodes", |s| {
            s.connect_shader_nodes(shader, from, to)
        })
    }

    /// Replaces the shader's graph with an empty one.
    pub fn shader_new_graph(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "shader_new_graph", |s| {
            s.shader_mut(shader)?.new_graph();
            Ok(())
        })
    }

    /// Edits plain shader fields (name, MIS, transparent shadow,
    /// heterogeneous volume) without marking the shader dirty.
    pub fn shader_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        edit: impl FnOnce(&mut Shader) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "shader_edit", |s| s.edit_shader(shader, edit))
    }

    pub fn shader_tag_used(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
        used: bool,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_tag_used", |s| s.tag_shader(shader, used))
    }

    pub fn shader_tag_update(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "shader_tag_update", |s| {
            s.tag_shader_update(shader)
        })
    }

    pub fn shader_remove(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: ShaderId,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "shader_remove", |s| {
            s.remove_shader(shader).map(drop)
        })
    }

    // Lights.

    /// Creates a light emitting through `shader`, or through a new default
    /// emission shader.
    pub fn light_create(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: Option<ShaderId>,
    ) -> HostResult<LightId> {
        self.structural_scene(client, scene, "light_create", |s| {
            let shader = match shader {
                Some(shader) => shader,
                None => s.add_shader(Shader::default_light()),
            };
            s.add_light(shader)
        })
    }

    /// Edits light fields without marking the light dirty; follow with
    /// [`light_tag_update`](Self::light_tag_update).
    pub fn light_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        light: LightId,
        edit: impl FnOnce(&mut Light) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "light_edit", |s| s.edit_light(light, edit))
    }

    pub fn light_tag_update(
        &self,
        client: ClientId,
        scene: SceneId,
        light: LightId,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "light_tag_update", |s| s.tag_light(light))
    }

    pub fn light_remove(&self, client: ClientId, scene: SceneId, light: LightId) -> HostResult<()> {
        self.structural_scene(client, scene, "light_remove", |s| {
            s.remove_light(light).map(drop)
        })
    }

    // Clipping planes.

    /// Adds a plane `(a, b, c, d)`, reusing a discarded slot if there is one.
    pub fn clipping_plane_add(
        &self,
        client: ClientId,
        scene: SceneId,
        plane: Vec4,
    ) -> HostResult<u32> {
        self.structural_scene(client, scene, "clipping_plane_add", |s| {
            Ok(s.clipping_planes_mut().add(plane))
        })
    }

    pub fn clipping_plane_discard(
        &self,
        client: ClientId,
        scene: SceneId,
        index: u32,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "clipping_plane_discard", |s| {
            s.clipping_planes_mut().discard(index)
        })
    }

    pub fn clipping_plane_set(
        &self,
        client: ClientId,
        scene: SceneId,
        index: u32,
        plane: Vec4,
    ) -> HostResult<()> {
        self.structural_scene(client, scene, "clipping_plane_set", |s| {
            s.clipping_planes_mut().set(index, plane)
        })
    }

    pub fn clipping_planes_clear(&self, client: ClientId, scene: SceneId) -> HostResult<()> {
        self.structural_scene(client, scene, "clipping_planes_clear", |s| {
            s.clipping_planes_mut().clear();
            Ok(())
        })
    }

    // Camera and settings blocks.

    pub fn camera_set_size(
        &self,
        client: ClientId,
        scene: SceneId,
        width: u32,
        height: u32,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "camera_set_size", |s| {
            s.camera_mut().set_size(width, height);
            Ok(())
        })
    }

    pub fn camera_size(&self, client: ClientId, scene: SceneId) -> HostResult<(u32, u32)> {
        self.with_scene(client, scene, "camera_size", |s| {
            Ok(s.read(|s| (s.camera().width, s.camera().height)))
        })
    }

    /// Edits camera fields without marking the camera dirty; follow with
    /// [`camera_update`](Self::camera_update).
    pub fn camera_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        edit: impl FnOnce(&mut Camera) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "camera_edit", |s| Ok(s.edit_camera(edit)))
    }

    pub fn camera_update(&self, client: ClientId, scene: SceneId) -> HostResult<()> {
        self.edit_scene(client, scene, "camera_update", |s| {
            s.tag_camera();
            Ok(())
        })
    }

    pub fn integrator_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        edit: impl FnOnce(&mut Integrator) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "integrator_edit", |s| Ok(s.edit_integrator(edit)))
    }

    pub fn integrator_tag_update(&self, client: ClientId, scene: SceneId) -> HostResult<()> {
        self.edit_scene(client, scene, "integrator_tag_update", |s| {
            s.tag_integrator();
            Ok(())
        })
    }

    pub fn film_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        edit: impl FnOnce(&mut Film) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "film_edit", |s| Ok(s.edit_film(edit)))
    }

    pub fn film_tag_update(&self, client: ClientId, scene: SceneId) -> HostResult<()> {
        self.edit_scene(client, scene, "film_tag_update", |s| {
            s.tag_film();
            Ok(())
        })
    }

    pub fn background_edit<R>(
        &self,
        client: ClientId,
        scene: SceneId,
        edit: impl FnOnce(&mut Background) -> R,
    ) -> HostResult<R> {
        self.edit_scene(client, scene, "background_edit", |s| Ok(s.edit_background(edit)))
    }

    pub fn background_tag_update(&self, client: ClientId, scene: SceneId) -> HostResult<()> {
        self.edit_scene(client, scene, "background_tag_update", |s| {
            s.tag_background();
            Ok(())
        })
    }

    pub fn background_set_shader(
        &self,
        client: ClientId,
        scene: SceneId,
        shader: Option<ShaderId>,
    ) -> HostResult<()> {
        self.edit_scene(client, scene, "background_set_shader", |s| {
            s.set_background_shader(shader)
        })
    }

    // Sessions.

    fn with_session<R>(
        &self,
        client: ClientId,
        id: SessionId,
        operation: &str,
        call: impl FnOnce(&Session) -> HostResult<R>,
    ) -> HostResult<R> {
        let result = self
            .sessions
            .get_owned(client, id)
            .and_then(|session| call(&session));
        self.report(client, operation, result)
    }

    /// Creates a session on the device named by the params block.
    pub fn session_create(
        &self,
        client: ClientId,
        params: SessionParamsId,
    ) -> HostResult<SessionId> {
        let result = self.require_client(client).and_then(|()| {
            let params = self.session_params.get_owned(client, params)?.read().clone();
            let index = params.device;
            let device = self.devices.get(index)?;
            let engine = Arc::clone(&self.engine);
            let id = self.sessions.try_insert_with_key(client, |id| {
                Session::new(id, params, index, device, engine)
            })?;
            self.clients.track(client, OwnedHandle::Session(id));
            Ok(id)
        });
        self.report(client, "session_create", result)
    }

    /// Stops and destroys a session. Its scene is detached, not destroyed.
    pub fn session_destroy(&self, client: ClientId, id: SessionId) -> HostResult<()> {
        let result = self.sessions.remove(client, id).map(|session| {
            self.clients.untrack(client, OwnedHandle::Session(id));
            if let Some(scene) = session.destroy() {
                if scene.session() == Some(id) {
                    scene.set_session(None);
                }
            }
        });
        self.report(client, "session_destroy", result)
    }

    /// Attaches `scene` to `session`, moving it away from a session it was
    /// attached to before. Fails if that session is running.
    pub fn session_set_scene(
        &self,
        client: ClientId,
        session: SessionId,
        scene: SceneId,
    ) -> HostResult<()> {
        use SessionState::*;
        self.with_session(client, session, "session_set_scene", |target| {
            let shared = self.scene_ref(client, scene)?;
            target
                .state()
                .require("set_scene", &[Created, Configured, EndedRun])?;

            if let Some(other) = shared.session().filter(|&other| other != session) {
                if let Ok(previous) = self.sessions.get(other) {
                    if previous.state().is_running() {
                        return Err(HostError::ScenePrecondition {
                            operation: "session_set_scene",
                            reason: format!(
                                "the scene is being rendered by session {:#x}",
                                other.raw()
                            ),
                        });
                    }
                    previous.detach_scene()?;
                }
            }

            let old = target.scene();
            target.set_scene(Arc::clone(&shared))?;
            if let Some(old) = old.filter(|old| !Arc::ptr_eq(old, &shared)) {
                old.set_session(None);
            }
            shared.set_session(Some(session));
            Ok(())
        })
    }

    /// Sets a full-frame buffer of `width` x `height` and the sample budget.
    pub fn session_reset(
        &self,
        client: ClientId,
        session: SessionId,
        width: u32,
        height: u32,
        samples: u32,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_reset", |s| {
            s.reset(BufferParams::full(width, height), samples)
        })
    }

    /// Sets a buffer covering a region of a larger frame.
    pub fn session_reset_region(
        &self,
        client: ClientId,
        session: SessionId,
        params: BufferParams,
        samples: u32,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_reset_region", |s| {
            s.reset(params, samples)
        })
    }

    pub fn session_add_pass(
        &self,
        client: ClientId,
        session: SessionId,
        pass: PassType,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_add_pass", |s| s.add_pass(pass))
    }

    pub fn session_clear_passes(&self, client: ClientId, session: SessionId) -> HostResult<()> {
        self.with_session(client, session, "session_clear_passes", Session::clear_passes)
    }

    pub fn session_set_samples(
        &self,
        client: ClientId,
        session: SessionId,
        samples: u32,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_samples", |s| {
            s.set_samples(samples)
        })
    }

    pub fn session_prepare_run(&self, client: ClientId, session: SessionId) -> HostResult<()> {
        self.with_session(client, session, "session_prepare_run", Session::prepare_run)
    }

    /// Renders one sample on the calling thread.
    pub fn session_sample(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<SampleStatus> {
        self.with_session(client, session, "session_sample", Session::sample)
    }

    /// Starts the background render loop.
    pub fn session_start(&self, client: ClientId, session: SessionId) -> HostResult<()> {
        self.with_session(client, session, "session_start", Session::start)
    }

    pub fn session_end_run(&self, client: ClientId, session: SessionId) -> HostResult<()> {
        self.with_session(client, session, "session_end_run", Session::end_run)
    }

    /// Blocks until the background loop stops, dispatching callbacks on the
    /// calling thread meanwhile.
    pub fn session_wait(&self, client: ClientId, session: SessionId) -> HostResult<()> {
        self.with_session(client, session, "session_wait", |s| {
            s.wait();
            Ok(())
        })
    }

    pub fn session_cancel(
        &self,
        client: ClientId,
        session: SessionId,
        message: &str,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_cancel", |s| s.cancel(message))
    }

    pub fn session_set_pause(
        &self,
        client: ClientId,
        session: SessionId,
        pause: bool,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_pause", |s| s.set_pause(pause))
    }

    pub fn session_is_paused(&self, client: ClientId, session: SessionId) -> HostResult<bool> {
        self.with_session(client, session, "session_is_paused", |s| Ok(s.is_paused()))
    }

    pub fn session_state(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<SessionState> {
        self.with_session(client, session, "session_state", |s| Ok(s.state()))
    }

    /// Delivers queued callback events on the calling thread.
    pub fn session_dispatch_events(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<usize> {
        self.with_session(client, session, "session_dispatch_events", |s| {
            Ok(s.dispatch_events())
        })
    }

    // Session callbacks.

    pub fn session_set_update_callback(
        &self,
        client: ClientId,
        session: SessionId,
        callback: Option<StatusCallback>,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_update_callback", |s| {
            s.set_status_callback(callback);
            Ok(())
        })
    }

    pub fn session_set_cancel_callback(
        &self,
        client: ClientId,
        session: SessionId,
        callback: Option<CancelCallback>,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_cancel_callback", |s| {
            s.set_cancel_callback(callback);
            Ok(())
        })
    }

    pub fn session_set_update_tile_callback(
        &self,
        client: ClientId,
        session: SessionId,
        callback: Option<TileCallback>,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_update_tile_callback", |s| {
            s.set_tile_update_callback(callback);
            Ok(())
        })
    }

    pub fn session_set_write_tile_callback(
        &self,
        client: ClientId,
        session: SessionId,
        callback: Option<TileCallback>,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_write_tile_callback", |s| {
            s.set_tile_write_callback(callback);
            Ok(())
        })
    }

    pub fn session_set_display_update_callback(
        &self,
        client: ClientId,
        session: SessionId,
        callback: Option<DisplayCallback>,
    ) -> HostResult<()> {
        self.with_session(client, session, "session_set_display_update_callback", |s| {
            s.set_display_update_callback(callback);
            Ok(())
        })
    }

    // Buffers and progress.

    pub fn session_float_buffer(
        &self,
        client: ClientId,
        session: SessionId,
        pass: PassType,
    ) -> HostResult<Vec<f32>> {
        self.with_session(client, session, "session_get_float_buffer", |s| {
            s.float_buffer(pass)
        })
    }

    /// Copy of the combined pass, four floats per pixel.
    pub fn session_copy_buffer(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<Vec<f32>> {
        self.with_session(client, session, "session_copy_buffer", Session::copy_buffer)
    }

    pub fn session_buffer_info(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<BufferInfo> {
        self.with_session(client, session, "session_buffer_info", |s| Ok(s.buffer_info()))
    }

    pub fn progress_reset(&self, client: ClientId, session: SessionId) -> HostResult<()> {
        self.with_session(client, session, "progress_reset", |s| {
            s.progress_reset();
            Ok(())
        })
    }

    pub fn progress_sample(&self, client: ClientId, session: SessionId) -> HostResult<u32> {
        self.with_session(client, session, "progress_sample", |s| Ok(s.progress_sample()))
    }

    /// `(samples done, sample budget)`.
    pub fn tile_sample_info(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<(u32, u32)> {
        self.with_session(client, session, "tile_sample_info", |s| {
            Ok(s.progress().tile_sample_info())
        })
    }

    /// `(total render time, time of the last sample)`.
    pub fn progress_time(
        &self,
        client: ClientId,
        session: SessionId,
    ) -> HostResult<(Duration, Duration)> {
        self.with_session(client, session, "progress_time", |s| Ok(s.progress().time()))
    }

    pub fn progress_fraction(&self, client: ClientId, session: SessionId) -> HostResult<f32> {
        self.with_session(client, session, "progress_fraction", |s| {
            Ok(s.progress().fraction())
        })
    }

    /// Writes the session status into `holder`. Returns `false` on an
    /// invalid handle.
    pub fn session_status(
        &self,
        client: ClientId,
        session: SessionId,
        holder: &mut StringHolder,
    ) -> bool {
        self.with_session(client, session, "session_status", |s| Ok(s.status().0))
            .map(|status| holder.set(status))
            .is_ok()
    }

    /// Writes the session substatus into `holder`. After a cancel this is
    /// the cancel message.
    pub fn session_substatus(
        &self,
        client: ClientId,
        session: SessionId,
        holder: &mut StringHolder,
    ) -> bool {
        self.with_session(client, session, "session_substatus", |s| Ok(s.status().1))
            .map(|substatus| holder.set(substatus))
            .is_ok()
    }
}

fn raw_list<K: RawHandle>(keys: Vec<K>) -> String {
    keys.into_iter()
        .map(|key| key.raw().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Drop for RenderHost {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn host() -> RenderHost {
        RenderHost::preview(HostConfig::default())
    }

    #[test]
    fn test_handles_are_scoped_per_client() {
        let host = host();
        let a = host.new_client();
        let b = host.new_client();
        let params = host.scene_params_create(a, SceneParams::default()).unwrap();
        let scene = host.scene_create(a, params).unwrap();

        assert!(matches!(
            host.object_add(b, scene),
            Err(HostError::InvalidHandle { kind: HandleKind::Scene, .. })
        ));
        assert!(host.scene_create(b, params).is_err());
        assert!(host.object_add(a, scene).is_ok());
    }

    #[test]
    fn test_failures_reach_client_logger() {
        let host = host();
        let client = host.new_client();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink: LoggerSink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |msg: &str| seen.lock().push(msg.to_string()))
        };
        host.set_logger(client, Some(sink)).unwrap();

        let params = host.scene_params_create(client, SceneParams::default()).unwrap();
        host.scene_params_destroy(client, params).unwrap();
        assert!(host.scene_create(client, params).is_err());

        if crate::logging::DIAGNOSTICS_ENABLED {
            let seen = seen.lock();
            assert_eq!(seen.len(), 1);
            assert!(seen[0].starts_with("scene_create: invalid scene params handle"));
        }
    }

    #[test]
    fn test_release_with_live_scene_warns() {
        let host = host();
        let client = host.new_client();
        let params = host.scene_params_create(client, SceneParams::default()).unwrap();
        let scene = host.scene_create(client, params).unwrap();

        let Err(HostError::UsageWarning(message)) = host.release_client(client) else {
            panic!("expected a usage warning");
        };
        assert!(message.contains(&format!("scenes [{}]", scene.raw())));
        assert!(message.contains("sessions []"));
        // Orphans can still be destroyed with the old ID.
        assert!(host.scene_destroy(client, scene).is_ok());
        assert!(host.scene_params_destroy(client, params).is_ok());
    }

    #[test]
    fn test_scene_moves_between_sessions() {
        let host = host();
        let client = host.new_client();
        let scene_params = host.scene_params_create(client, SceneParams::default()).unwrap();
        let session_params = host
            .session_params_create(client, SessionParams::default())
            .unwrap();
        let scene = host.scene_create(client, scene_params).unwrap();
        let first = host.session_create(client, session_params).unwrap();
        let second = host.session_create(client, session_params).unwrap();

        host.session_set_scene(client, first, scene).unwrap();
        assert_eq!(
            host.session_state(client, first).unwrap(),
            SessionState::Configured
        );
        host.session_set_scene(client, second, scene).unwrap();
        assert_eq!(
            host.session_state(client, first).unwrap(),
            SessionState::Created
        );
        assert_eq!(
            host.session_state(client, second).unwrap(),
            SessionState::Configured
        );
    }

    #[test]
    fn test_multidevice_is_cached() {
        let host = host();
        let first = host.create_multidevice(&[0]).unwrap();
        let again = host.create_multidevice(&[0, 0]).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, host.device_count());
        assert_eq!(host.multidevice_count(), 1);
        assert_eq!(host.device_type(first).unwrap(), DeviceKind::Multi);
    }

    #[test]
    fn test_runtime_config_toggles() {
        let host = host();
        host.path_init("/opt/engine", "/tmp/user");
        host.putenv("KERNEL_CACHE", "off");
        host.set_log_to_stdout(true);
        host.edit_debug_flags(|flags| flags.cpu_allow_qbvh = false);

        let config = host.config();
        assert_eq!(config.install_path, Some(PathBuf::from("/opt/engine")));
        assert_eq!(config.environment.get("KERNEL_CACHE").map(String::as_str), Some("off"));
        assert!(config.log_to_stdout);
        assert!(!host.debug_flags().cpu_allow_qbvh);
    }

    #[test]
    fn test_shutdown_invalidates_handles() {
        let host = host();
        let client = host.new_client();
        let params = host.scene_params_create(client, SceneParams::default()).unwrap();
        host.shutdown();
        assert!(host.scene_params(client, params).is_err());
        assert!(host.scene_params_create(client, SceneParams::default()).is_err());
    }
}
