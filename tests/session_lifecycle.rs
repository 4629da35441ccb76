//! Session lifecycle tests: stepped and background runs, cancellation,
//! validation and read-after-write visibility.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use parking_lot::Mutex;
use rstest::rstest;

use common::{host, triangle_fixture};
use render_host::{
    BufferInfo, HostError, PassType, SampleStatus, SceneParams, SessionParams, SessionState,
    ShaderNodeKind, StringHolder, TileView,
};

/// Node ID of the diffuse node in the default surface shader.
const DEFAULT_SURFACE_DIFFUSE: u32 = 1;

#[rstest]
#[case::square(8, 8, 1)]
#[case::wide(16, 9, 4)]
#[case::ragged_tiles(5, 3, 2)]
fn test_stepped_run_fills_buffer(#[case] width: u32, #[case] height: u32, #[case] samples: u32) {
    let host = host();
    let f = triangle_fixture(&host, width, height, samples);

    host.session_prepare_run(f.client, f.session).unwrap();
    let mut steps = 0;
    while host.session_sample(f.client, f.session).unwrap() == SampleStatus::Continue {
        steps += 1;
        assert!(steps <= samples, "sampling did not stop at the budget");
    }
    assert_eq!(host.progress_sample(f.client, f.session).unwrap(), samples);
    assert_eq!(
        host.tile_sample_info(f.client, f.session).unwrap(),
        (samples, samples)
    );
    assert_eq!(host.progress_fraction(f.client, f.session).unwrap(), 1.0);

    host.session_end_run(f.client, f.session).unwrap();
    assert_eq!(
        host.session_state(f.client, f.session).unwrap(),
        SessionState::EndedRun
    );

    let pixels = host.session_copy_buffer(f.client, f.session).unwrap();
    assert_eq!(pixels.len(), (width * height * 4) as usize);
    assert_eq!(
        host.session_buffer_info(f.client, f.session).unwrap(),
        BufferInfo {
            size: (width * height * 4) as usize,
            stride: 4
        }
    );
    let mut status = StringHolder::new();
    assert!(host.session_status(f.client, f.session, &mut status));
    assert_eq!(status.get(), "Done");
}

#[test]
fn test_sample_before_prepare_is_a_state_error() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 2);

    // Configured: a scene is attached but no run is prepared.
    assert!(matches!(
        host.session_sample(f.client, f.session),
        Err(HostError::StatePrecondition {
            state: SessionState::Configured,
            ..
        })
    ));

    // Created: a fresh session without a scene.
    let params = host
        .session_params_create(f.client, SessionParams::default())
        .unwrap();
    let fresh = host.session_create(f.client, params).unwrap();
    assert!(matches!(
        host.session_sample(f.client, fresh),
        Err(HostError::StatePrecondition {
            state: SessionState::Created,
            ..
        })
    ));

    assert_eq!(host.progress_sample(f.client, f.session).unwrap(), 0);
    assert_eq!(host.progress_sample(f.client, fresh).unwrap(), 0);
}

#[test]
fn test_resize_without_repopulating_fails_validation() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 1);

    host.mesh_resize(f.client, f.scene, f.mesh, 2, 1).unwrap();
    let err = host.session_prepare_run(f.client, f.session).unwrap_err();
    assert!(matches!(&err, HostError::Validation(msg) if msg.contains("references vertex 2")));
    assert_eq!(
        host.session_state(f.client, f.session).unwrap(),
        SessionState::Configured
    );

    host.mesh_set_verts(
        f.client,
        f.scene,
        f.mesh,
        &[-5.0, -5.0, 1.0, 5.0, -5.0, 1.0, 0.0, 5.0, 1.0],
    )
    .unwrap();
    host.session_prepare_run(f.client, f.session).unwrap();
    assert_eq!(
        host.session_sample(f.client, f.session).unwrap(),
        SampleStatus::Done
    );
}

#[test]
fn test_edit_is_visible_to_next_sample() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 8);
    let shader = host.scene_default_surface(f.client, f.scene).unwrap();

    host.session_prepare_run(f.client, f.session).unwrap();
    host.session_sample(f.client, f.session).unwrap();
    host.session_sample(f.client, f.session).unwrap();
    assert_eq!(host.progress_sample(f.client, f.session).unwrap(), 2);

    host.shader_node_set_attribute_vec(
        f.client,
        f.scene,
        shader,
        DEFAULT_SURFACE_DIFFUSE,
        "Color",
        Vec3::new(0.0, 1.0, 0.0),
    )
    .unwrap();
    host.session_sample(f.client, f.session).unwrap();

    // Accumulation restarted from the edited scene.
    assert_eq!(host.progress_sample(f.client, f.session).unwrap(), 1);
    let pixels = host.session_copy_buffer(f.client, f.session).unwrap();
    let centre = (2 * 4 + 1) * 4;
    assert_eq!(pixels[centre], 0.0);
    assert!(pixels[centre + 1] > 0.5);
}

#[test]
fn test_mismatched_setters_are_rejected() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 1);
    let shader = host.scene_default_surface(f.client, f.scene).unwrap();

    let err = host
        .shader_node_set_attribute_float(
            f.client,
            f.scene,
            shader,
            DEFAULT_SURFACE_DIFFUSE,
            "Color",
            1.0,
        )
        .unwrap_err();
    assert!(matches!(err, HostError::UnknownAttribute { .. }));

    let err = host
        .shader_node_set_enum(
            f.client,
            f.scene,
            shader,
            DEFAULT_SURFACE_DIFFUSE,
            ShaderNodeKind::Math,
            "operation",
            0,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        HostError::TypeMismatch {
            expected: ShaderNodeKind::Math,
            actual: ShaderNodeKind::Diffuse,
            ..
        }
    ));

    host.session_prepare_run(f.client, f.session).unwrap();
    assert_eq!(
        host.session_sample(f.client, f.session).unwrap(),
        SampleStatus::Done
    );
}

#[test]
fn test_cancel_mid_run() {
    let host = host();
    let f = triangle_fixture(&host, 8, 8, 1_000_000);

    host.session_prepare_run(f.client, f.session).unwrap();
    host.session_start(f.client, f.session).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while host.progress_sample(f.client, f.session).unwrap() == 0 {
        assert!(Instant::now() < deadline, "worker never produced a sample");
        std::thread::sleep(Duration::from_millis(1));
    }

    host.session_cancel(f.client, f.session, "user abort").unwrap();
    let started = Instant::now();
    host.session_wait(f.client, f.session).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(
        host.session_state(f.client, f.session).unwrap(),
        SessionState::Cancelled
    );
    let mut substatus = StringHolder::new();
    assert!(host.session_substatus(f.client, f.session, &mut substatus));
    assert_eq!(substatus.get(), "user abort");
}

#[test]
fn test_background_run_delivers_callbacks_on_waiting_thread() {
    let host = host();
    let f = triangle_fixture(&host, 8, 8, 3);
    let waiter = std::thread::current().id();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let writes = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = Arc::clone(&updates);
        host.session_set_update_tile_callback(
            f.client,
            f.session,
            Some(Box::new(move |tile: &TileView<'_>| {
                assert_eq!(std::thread::current().id(), waiter);
                assert_eq!(tile.pixels.len(), (tile.w * tile.h * 4) as usize);
                updates.lock().push(tile.sample);
            })),
        )
        .unwrap();
    }
    {
        let writes = Arc::clone(&writes);
        host.session_set_write_tile_callback(
            f.client,
            f.session,
            Some(Box::new(move |tile: &TileView<'_>| {
                assert_eq!(tile.pass, PassType::Combined);
                writes.lock().push((tile.x, tile.y, tile.sample));
            })),
        )
        .unwrap();
    }

    host.session_prepare_run(f.client, f.session).unwrap();
    host.session_start(f.client, f.session).unwrap();
    host.session_wait(f.client, f.session).unwrap();

    assert_eq!(
        host.session_state(f.client, f.session).unwrap(),
        SessionState::EndedRun
    );
    // 8x8 in 4x4 tiles: four tiles per sample.
    assert_eq!(*updates.lock(), vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
    let writes = writes.lock();
    assert_eq!(writes.len(), 4);
    assert!(writes.iter().all(|&(_, _, sample)| sample == 3));
}

#[test]
fn test_cancel_callback_stops_stepped_run() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 10);
    let asked = Arc::new(Mutex::new(0));
    {
        let asked = Arc::clone(&asked);
        host.session_set_cancel_callback(
            f.client,
            f.session,
            Some(Box::new(move |_| {
                let mut asked = asked.lock();
                *asked += 1;
                *asked > 2
            })),
        )
        .unwrap();
    }

    host.session_prepare_run(f.client, f.session).unwrap();
    let mut statuses = Vec::new();
    loop {
        let status = host.session_sample(f.client, f.session).unwrap();
        statuses.push(status);
        if status != SampleStatus::Continue {
            break;
        }
    }
    assert_eq!(statuses.last(), Some(&SampleStatus::Cancelled));
    assert_eq!(
        host.session_state(f.client, f.session).unwrap(),
        SessionState::Cancelled
    );
}

#[test]
fn test_second_run_after_end_run() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 2);

    host.session_prepare_run(f.client, f.session).unwrap();
    while host.session_sample(f.client, f.session).unwrap() == SampleStatus::Continue {}
    host.session_end_run(f.client, f.session).unwrap();

    host.session_reset(f.client, f.session, 6, 2, 1).unwrap();
    host.session_add_pass(f.client, f.session, PassType::Depth)
        .unwrap();
    host.session_prepare_run(f.client, f.session).unwrap();
    assert_eq!(
        host.session_sample(f.client, f.session).unwrap(),
        SampleStatus::Done
    );
    host.session_end_run(f.client, f.session).unwrap();

    let depth = host
        .session_float_buffer(f.client, f.session, PassType::Depth)
        .unwrap();
    assert_eq!(depth.len(), 6 * 2);
    assert!(host
        .session_float_buffer(f.client, f.session, PassType::Normal)
        .is_err());
}

#[test]
fn test_pause_blocks_sampling_until_resumed() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 2);

    host.session_prepare_run(f.client, f.session).unwrap();
    host.session_set_pause(f.client, f.session, true).unwrap();
    assert!(host.session_is_paused(f.client, f.session).unwrap());
    assert!(host.session_sample(f.client, f.session).is_err());
    assert_eq!(host.progress_sample(f.client, f.session).unwrap(), 0);

    host.session_set_pause(f.client, f.session, false).unwrap();
    assert_eq!(
        host.session_sample(f.client, f.session).unwrap(),
        SampleStatus::Continue
    );
}

#[test]
fn test_destroy_session_keeps_scene() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 2);
    host.session_prepare_run(f.client, f.session).unwrap();
    host.session_start(f.client, f.session).unwrap();
    host.session_destroy(f.client, f.session).unwrap();

    assert!(matches!(
        host.session_state(f.client, f.session),
        Err(HostError::InvalidHandle { .. })
    ));
    assert!(host.object_add(f.client, f.scene).is_ok());

    let scene_params = host
        .scene_params_create(f.client, SceneParams::default())
        .unwrap();
    assert!(host.scene_create(f.client, scene_params).is_ok());
}
