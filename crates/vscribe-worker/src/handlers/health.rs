//! Health endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub revision: String,
    #[serde(rename = "buildTime")]
    pub build_time: String,
    pub commit: String,
}

/// Unauthenticated liveness probe with build identity.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        revision: std::env::var("K_REVISION").unwrap_or_else(|_| "unknown".to_string()),
        build_time: std::env::var("BUILD_TIME").unwrap_or_else(|_| "unknown".to_string()),
        commit: std::env::var("COMMIT_SHA").unwrap_or_else(|_| "unknown".to_string()),
    })
}
