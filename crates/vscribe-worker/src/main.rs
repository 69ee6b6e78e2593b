//! Video analysis worker binary.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vscribe_queue::{TaskQueueClient, TaskQueueConfig};
use vscribe_worker::{routes, shutdown, AppState, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vscribe=info".parse().unwrap()))
        .init();

    info!("Starting vscribe-worker");

    let config = WorkerConfig::from_env();
    let missing = config.missing_required();
    if !missing.is_empty() {
        if config.is_production() {
            error!("Missing required environment variables: {}", missing.join(", "));
            std::process::exit(1);
        }
        warn!(
            "Missing environment variables (tolerated in development): {}",
            missing.join(", ")
        );
    }

    // The codec toolchain is a hard runtime dependency
    if let Err(e) = vscribe_media::check_ffmpeg().and(vscribe_media::check_ffprobe()) {
        if config.is_production() {
            error!("Codec toolchain missing: {}", e);
            std::process::exit(1);
        }
        warn!("Codec toolchain missing (tolerated in development): {}", e);
    }

    let queue = if config.is_production() {
        match TaskQueueClient::from_env().await {
            Ok(q) => q,
            Err(e) => {
                error!("Failed to create task queue client: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match TaskQueueConfig::from_env().and_then(TaskQueueClient::new) {
            Ok(q) => q,
            Err(e) => {
                error!("Failed to create task queue client: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = match AppState::build(config.clone(), queue) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to build worker state: {}", e);
            std::process::exit(1);
        }
    };

    shutdown::install(state.active_jobs.clone(), state.status.clone());

    let metrics_handle = PrometheusBuilder::new().install_recorder().ok();
    let app = routes::create_router(state, metrics_handle);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
