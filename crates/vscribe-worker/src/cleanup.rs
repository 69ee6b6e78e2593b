//! Deterministic cleanup of transient artifacts.
//!
//! On every terminal state the source video key is deleted (a missing
//! key is success), the job's transient state blobs are removed, and
//! the checkpoint row is dropped. Per-job temp dirs are owned by
//! `TempDir` guards and vanish with them.

use tracing::warn;

use vscribe_storage::JobStateStore;

use crate::state::AppState;

/// Cleanup after a successful job.
pub async fn finalize_success(state: &AppState, user_id: &str, upload_id: &str) {
    remove_shared_artifacts(state, user_id, upload_id).await;
}

/// Cleanup after a permanent failure. Identical to the success path:
/// nothing transient may outlive a terminal state.
pub async fn finalize_failure(state: &AppState, user_id: &str, upload_id: &str) {
    remove_shared_artifacts(state, user_id, upload_id).await;
}

async fn remove_shared_artifacts(state: &AppState, user_id: &str, upload_id: &str) {
    let source = vscribe_models::source_key(user_id, upload_id);
    if let Err(e) = state.storage.delete_object(&source).await {
        if !e.is_not_found() {
            warn!(upload_id, step = "cleanup", "Failed to delete source object: {}", e);
        }
    }

    let blobs = JobStateStore::new(state.storage.clone(), user_id, upload_id);
    if let Err(e) = blobs.clear().await {
        warn!(upload_id, step = "cleanup", "Failed to clear state blobs: {}", e);
    }

    if let Err(e) = state.checkpoints.delete(upload_id).await {
        warn!(upload_id, step = "cleanup", "Failed to delete checkpoint: {}", e);
    }
}
