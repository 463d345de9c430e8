use tempfile::tempdir;

use docsync_core::contract::{MockBackend, Resource};
use docsync_core::hierarchy::ensure_container_chain;
use docsync_core::retry::RetryPolicy;
use docsync_core::state::StateStore;

fn chain(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn live(id: &str) -> Resource {
    Resource {
        id: id.to_string(),
        name: String::new(),
        trashed: false,
        mime_type: None,
    }
}

#[tokio::test]
async fn chain_is_created_top_down() {
    let dir = tempdir().unwrap();
    let mut store = StateStore::open(dir.path().join("state.json")).unwrap();
    let retry = RetryPolicy::new(1);

    let mut backend = MockBackend::new();
    let mut sequence = mockall::Sequence::new();
    backend
        .expect_create_container()
        .withf(|parent, name| parent == "root-1" && name == "a")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Ok("c-a".to_string()));
    backend
        .expect_create_container()
        .withf(|parent, name| parent == "c-a" && name == "b")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Ok("c-b".to_string()));

    let parent = ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(parent, "c-b");
    assert_eq!(store.state().containers["a"].remote_id, "c-a");
    assert_eq!(store.state().containers["a/b"].remote_id, "c-b");
}

#[tokio::test]
async fn complete_chain_only_performs_existence_checks() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let retry = RetryPolicy::new(1);

    {
        let mut store = StateStore::open(&state_path).unwrap();
        let mut backend = MockBackend::new();
        backend.expect_create_container().returning(|parent, name| {
            Ok(format!("c-{parent}-{name}"))
        });
        ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["a", "b"]))
            .await
            .unwrap();
    }

    let mut store = StateStore::open(&state_path).unwrap();
    let mut backend = MockBackend::new();
    backend.expect_get_resource().times(2).returning(|id| Ok(live(id)));
    backend.expect_create_container().times(0);

    let parent = ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(parent, store.state().containers["a/b"].remote_id);
}

#[tokio::test]
async fn same_named_directories_in_different_branches_stay_distinct() {
    let dir = tempdir().unwrap();
    let mut store = StateStore::open(dir.path().join("state.json")).unwrap();
    let retry = RetryPolicy::new(1);

    let mut backend = MockBackend::new();
    let mut n = 0;
    backend.expect_create_container().times(4).returning(move |_, _| {
        n += 1;
        Ok(format!("c-{n}"))
    });

    ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["x", "sub"]))
        .await
        .unwrap();
    ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["y", "sub"]))
        .await
        .unwrap();

    let containers = &store.state().containers;
    assert_eq!(containers.len(), 4);
    assert_ne!(
        containers["x/sub"].remote_id,
        containers["y/sub"].remote_id
    );
    assert_eq!(containers["x/sub"].display_name, "sub");
    assert_eq!(containers["y/sub"].display_name, "sub");
}

#[tokio::test]
async fn trashed_middle_container_is_recreated_under_live_parent() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let retry = RetryPolicy::new(1);

    {
        let mut store = StateStore::open(&state_path).unwrap();
        let mut backend = MockBackend::new();
        let mut n = 0;
        backend.expect_create_container().returning(move |_, _| {
            n += 1;
            Ok(format!("c-{n}"))
        });
        ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["a", "b"]))
            .await
            .unwrap();
    }

    let mut store = StateStore::open(&state_path).unwrap();
    let stale_id = store.state().containers["a/b"].remote_id.clone();

    let mut backend = MockBackend::new();
    // "a" is still live, "a/b" was trashed remotely.
    let gone = stale_id.clone();
    backend.expect_get_resource().returning(move |id| {
        Ok(Resource {
            id: id.to_string(),
            name: String::new(),
            trashed: id == gone,
            mime_type: None,
        })
    });
    let parent_of_b = store.state().containers["a"].remote_id.clone();
    let expected_parent = parent_of_b.clone();
    backend
        .expect_create_container()
        .withf(move |parent, name| parent == expected_parent && name == "b")
        .times(1)
        .returning(|_, _| Ok("c-b-new".to_string()));

    let parent = ensure_container_chain(&backend, &mut store, &retry, "root-1", &chain(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(parent, "c-b-new");
    assert_eq!(store.state().containers["a/b"].remote_id, "c-b-new");
    assert_ne!(store.state().containers["a/b"].remote_id, stale_id);
}
