//! Intake: validate a start-processing request and enqueue it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info};

use vscribe_models::{JobStatusRow, ProcessRequest};
use vscribe_queue::decode_payload;

use crate::state::AppState;

/// `POST /process`.
///
/// Returns immediately with the created task name; callers poll
/// `/status/{upload_id}` for progress. Duplicate submissions overwrite
/// the status row back to `pending` and enqueue a new task.
pub async fn process(State(state): State<AppState>, body: String) -> Response {
    let request: ProcessRequest = match decode_payload(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid request body: {}", e) })),
            )
                .into_response();
        }
    };

    if let Some(field) = request.missing_field() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("missing required field: {}", field) })),
        )
            .into_response();
    }

    // Advisory quota gate; accepted jobs always run to completion
    if let Some(quota) = &state.quota {
        match quota.check(&request.user_id).await {
            Ok(status) if status.is_exhausted() => {
                return (
                    StatusCode::PAYMENT_REQUIRED,
                    Json(json!({
                        "error": "quota_exceeded",
                        "planType": status.plan_type,
                        "quota": status.quota,
                        "used": status.used,
                        "remaining": status.remaining,
                    })),
                )
                    .into_response();
            }
            Ok(_) => {}
            Err(e) => {
                // A dead quota service must not block intake
                error!(upload_id = %request.upload_id, step = "quota", "Quota check failed, allowing job: {}", e);
            }
        }
    }

    let task_name = match state.queue.enqueue_process(&request).await {
        Ok(name) => name,
        Err(e) => {
            error!(upload_id = %request.upload_id, step = "intake", "Task enqueue failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to enqueue processing task" })),
            )
                .into_response();
        }
    };

    let row = JobStatusRow::pending(&request.upload_id, &request.user_id, &request.file_name);
    if let Err(e) = state.status.init_pending(&row).await {
        error!(upload_id = %request.upload_id, step = "intake", "Status row init failed: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to initialize job status" })),
        )
            .into_response();
    }

    info!(upload_id = %request.upload_id, task = %task_name, "Job accepted");
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "uploadId": request.upload_id,
            "taskName": task_name,
            "detectionMode": request.detection_mode,
        })),
    )
        .into_response()
}
