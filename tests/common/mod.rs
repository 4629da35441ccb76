//! Shared setup for the render host integration tests.

use render_host::{
    ClientId, HostConfig, MeshId, ObjectId, RenderHost, SceneId, SceneParams, SessionId,
    SessionParams,
};

/// Everything one client needs to render a scene.
pub struct Fixture {
    pub client: ClientId,
    pub scene: SceneId,
    pub session: SessionId,
    pub object: ObjectId,
    pub mesh: MeshId,
}

pub fn host() -> RenderHost {
    render_host::init_logging();
    RenderHost::preview(HostConfig::default())
}

/// A client with one triangle in front of a `width` x `height` camera and a
/// session attached to it.
pub fn triangle_fixture(host: &RenderHost, width: u32, height: u32, samples: u32) -> Fixture {
    let client = host.new_client();
    let scene_params = host
        .scene_params_create(client, SceneParams::default())
        .unwrap();
    let scene = host.scene_create(client, scene_params).unwrap();
    host.camera_set_size(client, scene, width, height).unwrap();
    host.camera_edit(client, scene, |camera| camera.compute_auto_viewplane())
        .unwrap();

    let object = host.object_add(client, scene).unwrap();
    let mesh = host.object_add_mesh(client, scene, object, None).unwrap();
    host.mesh_set_verts(
        client,
        scene,
        mesh,
        &[-5.0, -5.0, 1.0, 5.0, -5.0, 1.0, 0.0, 5.0, 1.0],
    )
    .unwrap();
    host.mesh_set_tris(client, scene, mesh, &[0, 1, 2], None, false)
        .unwrap();

    let session_params = host
        .session_params_create(
            client,
            SessionParams::default()
                .with_samples(samples)
                .with_tile_size(4, 4),
        )
        .unwrap();
    let session = host.session_create(client, session_params).unwrap();
    host.session_set_scene(client, session, scene).unwrap();

    Fixture {
        client,
        scene,
        session,
        object,
        mesh,
    }
}
