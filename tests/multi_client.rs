//! Several clients sharing one host.

mod common;

use rstest::rstest;

use common::{host, triangle_fixture, Fixture};
use render_host::{
    HandleKind, HostError, RawHandle, RenderHost, SampleStatus, SceneId, SceneParams, Sentinel,
};

fn run_to_completion(host: &RenderHost, f: &Fixture) -> Vec<f32> {
    host.session_prepare_run(f.client, f.session).unwrap();
    while host.session_sample(f.client, f.session).unwrap() == SampleStatus::Continue {}
    host.session_end_run(f.client, f.session).unwrap();
    host.session_copy_buffer(f.client, f.session).unwrap()
}

#[test]
fn test_concurrent_clients_are_isolated() {
    let host = host();
    let buffers: Vec<Vec<f32>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let f = triangle_fixture(&host, 8, 8, 3);
                    run_to_completion(&host, &f)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(buffers.len(), 4);
    for buffer in &buffers {
        assert_eq!(buffer.len(), 8 * 8 * 4);
        assert_eq!(buffer, &buffers[0]);
    }
}

#[test]
fn test_edits_by_one_client_do_not_reach_another() {
    let host = host();
    let a = triangle_fixture(&host, 4, 4, 1);
    let b = triangle_fixture(&host, 4, 4, 1);

    host.object_remove(a.client, a.scene, a.object).unwrap();
    host.mesh_remove(a.client, a.scene, a.mesh).unwrap();

    let with_triangle = run_to_completion(&host, &b);
    let empty = run_to_completion(&host, &a);
    assert_ne!(with_triangle, empty);
    assert!(empty.iter().all(|&v| v == 0.0 || v == 1.0));
}

#[rstest]
#[case::object_add("object_add")]
#[case::sample("sample")]
#[case::destroy_scene("destroy_scene")]
#[case::destroy_session("destroy_session")]
#[case::lock("lock")]
fn test_foreign_handles_are_rejected(#[case] operation: &str) {
    let host = host();
    let owner = triangle_fixture(&host, 4, 4, 1);
    let intruder = host.new_client();

    let result = match operation {
        "object_add" => host.object_add(intruder, owner.scene).map(drop),
        "sample" => host.session_sample(intruder, owner.session).map(drop),
        "destroy_scene" => host.scene_destroy(intruder, owner.scene),
        "destroy_session" => host.session_destroy(intruder, owner.session),
        "lock" => host.scene_lock(intruder, owner.scene),
        _ => unreachable!(),
    };
    assert!(matches!(result, Err(HostError::InvalidHandle { .. })));

    // The owner is unaffected.
    run_to_completion(&host, &owner);
}

#[test]
fn test_stale_handles_stay_invalid() {
    let host = host();
    let client = host.new_client();
    let params = host
        .scene_params_create(client, SceneParams::default())
        .unwrap();
    let old = host.scene_create(client, params).unwrap();
    host.scene_destroy(client, old).unwrap();

    let new = host.scene_create(client, params).unwrap();
    assert_ne!(old.raw(), new.raw());
    assert_eq!(
        host.object_add(client, old),
        Err(HostError::invalid(HandleKind::Scene, old.raw()))
    );
    assert!(host.object_add(client, new).is_ok());

    // Raw integers round-trip; unknown ones just fail lookup.
    assert_eq!(SceneId::from_raw(new.raw()), new);
    assert_eq!(host.object_add(client, SceneId::from_raw(0xdead)).map(|_| 1u8).or_sentinel(), 0);
}

#[test]
fn test_release_with_live_session_is_a_usage_warning() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 1);

    assert!(matches!(
        host.release_client(f.client),
        Err(HostError::UsageWarning(_))
    ));
    // Orphans stay usable until destroyed explicitly.
    run_to_completion(&host, &f);
    host.session_destroy(f.client, f.session).unwrap();
    host.scene_destroy(f.client, f.scene).unwrap();

    assert!(matches!(
        host.release_client(f.client),
        Err(HostError::InvalidHandle {
            kind: HandleKind::Client,
            ..
        })
    ));
}

#[test]
fn test_clean_release() {
    let host = host();
    let f = triangle_fixture(&host, 4, 4, 1);
    host.session_destroy(f.client, f.session).unwrap();
    host.scene_destroy(f.client, f.scene).unwrap();
    assert_eq!(host.release_client(f.client), Ok(()));
    assert!(host.object_add(f.client, f.scene).is_err());
}

#[test]
fn test_scene_rendered_elsewhere_cannot_move() {
    let host = host();
    let f = triangle_fixture(&host, 8, 8, 1_000_000);
    let params = host
        .session_params_create(f.client, Default::default())
        .unwrap();
    let other = host.session_create(f.client, params).unwrap();

    host.session_prepare_run(f.client, f.session).unwrap();
    assert!(matches!(
        host.session_set_scene(f.client, other, f.scene),
        Err(HostError::ScenePrecondition { .. })
    ));
    assert!(matches!(
        host.scene_destroy(f.client, f.scene),
        Err(HostError::ScenePrecondition { .. })
    ));

    host.session_end_run(f.client, f.session).unwrap();
    host.session_set_scene(f.client, other, f.scene).unwrap();
}
