//! Hierarchy mapping: directories become chains of remote container pages.
//!
//! Containers are keyed in state by the full path from the sync root, never
//! by display name alone, so same-named directories in different branches
//! never collide. Creation is strictly top-down: a container's remote id is
//! recorded before any child underneath it is touched.

use tracing::{debug, info, warn};

use crate::contract::{Backend, BackendError};
use crate::error::SyncError;
use crate::retry::{with_retry, RetryPolicy};
use crate::state::{now_rfc3339, ContainerRecord, StateStore};

/// Existence check shared by containers, pages and media: succeeds only when
/// the backend returns the resource untrashed. Trashed and deleted resources
/// classify as [`SyncError::ResourceGone`], which callers recover from by
/// recreating the resource under a fresh id.
pub async fn verify_live<B: Backend + ?Sized>(
    backend: &B,
    retry: &RetryPolicy,
    id: &str,
) -> Result<(), SyncError> {
    match with_retry(retry, "get_resource", || backend.get_resource(id)).await {
        Ok(resource) if !resource.trashed => Ok(()),
        Ok(_) => Err(SyncError::ResourceGone(format!("{id} is trashed"))),
        Err(SyncError::Backend(BackendError::Gone(_))) => {
            Err(SyncError::ResourceGone(format!("{id} is deleted")))
        }
        Err(e) => Err(e),
    }
}

/// Ensures every container along `hierarchy` exists remotely and is
/// recorded, returning the remote id of the document's immediate parent.
///
/// Recorded containers are revalidated against the backend before trust;
/// trashed or deleted ones fall through to creation under the previously
/// resolved parent, and the stale id is never reused. Re-running over an
/// already complete hierarchy performs existence checks only.
pub async fn ensure_container_chain<B: Backend + ?Sized>(
    backend: &B,
    store: &mut StateStore,
    retry: &RetryPolicy,
    root_container_id: &str,
    hierarchy: &[String],
) -> Result<String, SyncError> {
    let mut parent_id = root_container_id.to_string();

    for depth in 0..hierarchy.len() {
        let key = hierarchy[..=depth].join("/");
        let name = hierarchy[depth].clone();

        if let Some(record) = store.state().containers.get(&key).cloned() {
            match verify_live(backend, retry, &record.remote_id).await {
                Ok(()) => {
                    debug!(key = %key, remote_id = %record.remote_id, "Container verified live");
                    parent_id = record.remote_id;
                    continue;
                }
                Err(SyncError::ResourceGone(reason)) => {
                    warn!(key = %key, reason = %reason, "Recorded container is gone, recreating");
                }
                Err(e) => return Err(e),
            }
        }

        let created_id = with_retry(retry, "create_container", || {
            backend.create_container(&parent_id, &name)
        })
        .await?;
        info!(key = %key, remote_id = %created_id, "Created container");

        store.mutate(|s| {
            s.containers.insert(
                key.clone(),
                ContainerRecord {
                    remote_id: created_id.clone(),
                    display_name: name.clone(),
                    created_at: now_rfc3339(),
                },
            );
        })?;
        parent_id = created_id;
    }

    Ok(parent_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockBackend, Resource};

    fn resource(id: &str, trashed: bool) -> Resource {
        Resource {
            id: id.to_string(),
            name: String::new(),
            trashed,
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn verify_live_accepts_untrashed_resources() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_resource()
            .returning(|id| Ok(resource(id, false)));
        let retry = RetryPolicy::new(1);
        assert!(verify_live(&backend, &retry, "c-1").await.is_ok());
    }

    #[tokio::test]
    async fn verify_live_classifies_trashed_as_gone() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_resource()
            .returning(|id| Ok(resource(id, true)));
        let retry = RetryPolicy::new(1);
        let result = verify_live(&backend, &retry, "c-1").await;
        assert!(matches!(result, Err(SyncError::ResourceGone(_))));
    }

    #[tokio::test]
    async fn verify_live_classifies_deleted_as_gone() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_resource()
            .returning(|id| Err(BackendError::Gone(id.to_string())));
        let retry = RetryPolicy::new(1);
        let result = verify_live(&backend, &retry, "c-1").await;
        assert!(matches!(result, Err(SyncError::ResourceGone(_))));
    }

    #[tokio::test]
    async fn verify_live_propagates_auth_failures() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_resource()
            .returning(|_| Err(BackendError::Auth("bad token".into())));
        let retry = RetryPolicy::new(1);
        let result = verify_live(&backend, &retry, "c-1").await;
        assert!(matches!(
            result,
            Err(SyncError::Backend(BackendError::Auth(_)))
        ));
    }
}
