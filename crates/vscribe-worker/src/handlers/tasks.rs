//! Task-queue callback handlers.
//!
//! The queue interprets HTTP status only: 2xx acknowledges the task,
//! anything else redelivers it with an incremented retry-count header.
//! Deterministic job failures therefore return 200 after the status
//! row has been flipped to `error`, since redelivery cannot help them.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info};

use vscribe_models::{BatchTask, ProcessRequest};
use vscribe_queue::{decode_payload, RETRY_COUNT_HEADER};

use crate::batch::MAX_BATCH_RETRIES;
use crate::cleanup;
use crate::pipeline::{self, user_facing_error, PipelineOutcome};
use crate::state::AppState;

/// `POST /process-task`: run one job end-to-end.
pub async fn process_task(State(state): State<AppState>, body: String) -> Response {
    let request: ProcessRequest = match decode_payload(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid task payload: {}", e) })),
            )
                .into_response();
        }
    };

    match pipeline::run_job(&state, &request).await {
        Ok(PipelineOutcome::Completed) => {
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Ok(PipelineOutcome::BatchesDispatched) => (
            StatusCode::OK,
            Json(json!({ "success": true, "batched": true })),
        )
            .into_response(),
        Err(e) if e.is_queue_retryable() => {
            error!(upload_id = %request.upload_id, step = "process_task", "Retryable failure: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            // Terminal: the pipeline already wrote the error status
            (
                StatusCode::OK,
                Json(json!({ "success": false, "error": user_facing_error(&e) })),
            )
                .into_response()
        }
    }
}

/// `POST /process-ocr-batch`: run one batch continuation.
pub async fn process_ocr_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let task: BatchTask = match decode_payload(&body) {
        Ok(t) => t,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid batch payload: {}", e) })),
            )
                .into_response();
        }
    };

    let retry_count = parse_retry_count(&headers);
    if retry_count >= MAX_BATCH_RETRIES {
        let message = format!(
            "OCR batch {} failed after {} delivery attempts",
            task.batch_index,
            retry_count + 1
        );
        error!(upload_id = %task.upload_id, step = "ocr_batch", "{}", message);
        let _ = state.status.fail(&task.upload_id, &message).await;
        cleanup::finalize_failure(&state, &task.user_id, &task.upload_id).await;
        return (
            StatusCode::OK,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response();
    }

    match pipeline::run_ocr_batch(&state, &task).await {
        Ok(()) => {
            info!(
                upload_id = %task.upload_id,
                batch = task.batch_index,
                "Batch complete"
            );
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Err(e) if e.is_queue_retryable() => {
            error!(upload_id = %task.upload_id, step = "ocr_batch", "Retryable batch failure: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            error!(upload_id = %task.upload_id, step = "ocr_batch", "Terminal batch failure: {}", e);
            let _ = state
                .status
                .fail(&task.upload_id, &user_facing_error(&e))
                .await;
            cleanup::finalize_failure(&state, &task.user_id, &task.upload_id).await;
            (
                StatusCode::OK,
                Json(json!({ "success": false, "error": user_facing_error(&e) })),
            )
                .into_response()
        }
    }
}

fn parse_retry_count(headers: &HeaderMap) -> u32 {
    headers
        .get(RETRY_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
