//! Daily checkpoint garbage collection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::state::AppState;

/// `POST /cron/cleanup-checkpoints`: remove checkpoints past their
/// expiry. Invoked by a scheduled task.
pub async fn cleanup_checkpoints(State(state): State<AppState>) -> Response {
    match state.checkpoints.cleanup_expired().await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(json!({ "deletedCount": deleted })),
        )
            .into_response(),
        Err(e) => {
            error!(step = "checkpoint_sweep", "Checkpoint cleanup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "checkpoint cleanup failed" })),
            )
                .into_response()
        }
    }
}
