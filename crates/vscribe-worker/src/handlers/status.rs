//! Status reader and development result download.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use vscribe_models::{JobStatusRow, ProcessingMetadata};
use vscribe_storage::sink::XLSX_CONTENT_TYPE;

use crate::state::AppState;

/// Status row rendered for API consumers: identical fields, camelCase
/// names, plus the reader-side staleness sentinel.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub upload_id: String,
    pub user_id: String,
    pub file_name: String,
    pub status: vscribe_models::StatusKind,
    pub progress: u8,
    pub phase: vscribe_models::Phase,
    pub phase_progress: u8,
    pub phase_status: vscribe_models::PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<vscribe_models::Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProcessingMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the row says `processing` but the worker stopped
    /// touching it; the gateway synthesizes a failure from this. The
    /// row itself is never mutated by readers.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

impl StatusResponse {
    fn from_row(row: JobStatusRow, now: DateTime<Utc>) -> Self {
        let stale = row.is_stale(now);
        Self {
            upload_id: row.upload_id,
            user_id: row.user_id,
            file_name: row.file_name,
            status: row.status,
            progress: row.progress,
            phase: row.phase,
            phase_progress: row.phase_progress,
            phase_status: row.phase_status,
            stage: row.stage,
            sub_task: row.sub_task,
            estimated_time_remaining: row.estimated_time_remaining,
            started_at: row.started_at,
            updated_at: row.updated_at,
            result_key: row.result_key,
            metadata: row.metadata,
            error: row.error,
            stale,
        }
    }
}

/// `GET /status/{upload_id}`.
pub async fn get_status(State(state): State<AppState>, Path(upload_id): Path<String>) -> Response {
    match state.status.get(&upload_id).await {
        Ok(Some(row)) => Json(StatusResponse::from_row(row, Utc::now())).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown upload_id" })),
        )
            .into_response(),
        Err(e) => {
            error!(upload_id = %upload_id, step = "status_read", "Status read failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "status store unavailable" })),
            )
                .into_response()
        }
    }
}

/// `GET /result/{upload_id}`, development only; production callers
/// download through pre-signed URLs.
pub async fn get_result(State(state): State<AppState>, Path(upload_id): Path<String>) -> Response {
    if state.config.is_production() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "result downloads are served from object storage" })),
        )
            .into_response();
    }

    let row = match state.status.get(&upload_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "unknown upload_id" })),
            )
                .into_response();
        }
        Err(e) => {
            error!(upload_id = %upload_id, step = "result_read", "Status read failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(result_key) = row.result_key else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "result not ready" })),
        )
            .into_response();
    };

    match state.result_sink.load(&result_key).await {
        Ok(bytes) => {
            let file_name = result_key.rsplit('/').next().unwrap_or("report.xlsx").to_string();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!(upload_id = %upload_id, step = "result_read", "Result load failed: {}", e);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "result artifact missing" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_camel_case_with_sentinel() {
        let mut row = JobStatusRow::pending("up-1", "u1", "a.mp4");
        row.status = vscribe_models::StatusKind::Processing;
        row.updated_at = Utc::now() - chrono::Duration::seconds(600);

        let response = StatusResponse::from_row(row, Utc::now());
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["uploadId"], "up-1");
        assert_eq!(value["fileName"], "a.mp4");
        assert!(value.get("upload_id").is_none());
        assert_eq!(value["stale"], true);
    }

    #[test]
    fn test_fresh_row_omits_sentinel() {
        let row = JobStatusRow::pending("up-1", "u1", "a.mp4");
        let value = serde_json::to_value(StatusResponse::from_row(row, Utc::now())).unwrap();
        assert!(value.get("stale").is_none());
    }
}
