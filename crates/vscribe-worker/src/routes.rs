//! Worker router.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::cleanup_cron::cleanup_checkpoints;
use crate::handlers::health::health;
use crate::handlers::process::process;
use crate::handlers::status::{get_result, get_status};
use crate::handlers::tasks::{process_ocr_batch, process_task};
use crate::middleware::{request_logging, require_bearer};
use crate::state::AppState;

/// Build the worker router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let protected = Router::new()
        .route("/process", post(process))
        .route("/process-task", post(process_task))
        .route("/process-ocr-batch", post(process_ocr_batch))
        .route("/status/:upload_id", get(get_status))
        .route("/result/:upload_id", get(get_result))
        .route("/cron/cleanup-checkpoints", post(cleanup_checkpoints))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let health_routes = Router::new().route("/health", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(protected)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
