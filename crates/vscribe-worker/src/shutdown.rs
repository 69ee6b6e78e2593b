//! Graceful interruption.
//!
//! Signal handlers cover SIGTERM (platform scale-down), SIGINT
//! (operator stop), and SIGBUS (memory pressure), plus a panic hook for
//! uncaught failures. On receipt, every active job's status row is
//! flipped to `error` with a user-readable code, within a one-second
//! flush budget, and the process exits. Enqueued batch tasks are left
//! to the queue's natural retry behavior.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use vscribe_models::InterruptCode;
use vscribe_status::StatusRepo;

/// Budget for flushing status rows before exit.
const FLUSH_BUDGET: Duration = Duration::from_secs(1);

/// Registry of upload ids currently being processed by this worker.
#[derive(Clone, Default)]
pub struct ActiveJobs {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job; the guard deregisters on drop.
    pub fn register(&self, upload_id: &str) -> ActiveJobGuard {
        self.inner
            .lock()
            .expect("active jobs lock poisoned")
            .insert(upload_id.to_string());
        ActiveJobGuard {
            registry: self.clone(),
            upload_id: upload_id.to_string(),
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("active jobs lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn remove(&self, upload_id: &str) {
        self.inner
            .lock()
            .expect("active jobs lock poisoned")
            .remove(upload_id);
    }
}

/// Deregisters its job from the active set on drop.
pub struct ActiveJobGuard {
    registry: ActiveJobs,
    upload_id: String,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.upload_id);
    }
}

/// Install signal handlers and the panic trap.
pub fn install(active_jobs: ActiveJobs, status: StatusRepo) {
    spawn_signal_task(SignalKind::terminate(), InterruptCode::ServerShutdown, active_jobs.clone(), status.clone());
    spawn_signal_task(SignalKind::interrupt(), InterruptCode::ManualStop, active_jobs.clone(), status.clone());
    spawn_signal_task(
        SignalKind::from_raw(libc::SIGBUS),
        InterruptCode::ResourceLimit,
        active_jobs.clone(),
        status.clone(),
    );

    install_panic_trap(active_jobs, status);
}

fn spawn_signal_task(
    kind: SignalKind,
    code: InterruptCode,
    active_jobs: ActiveJobs,
    status: StatusRepo,
) {
    tokio::spawn(async move {
        let mut stream = match signal(kind) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install handler for {:?}: {}", kind, e);
                return;
            }
        };
        stream.recv().await;
        info!(code = code.as_str(), "Interrupt signal received");
        flush_and_exit(code, &active_jobs, &status).await;
    });
}

fn install_panic_trap(active_jobs: ActiveJobs, status: StatusRepo) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = tx.send(info.to_string());
        previous(info);
    }));

    tokio::spawn(async move {
        if let Some(message) = rx.recv().await {
            error!(code = "UNCAUGHT_EXCEPTION", "Uncaught panic: {}", message);
            flush_and_exit(InterruptCode::UncaughtException, &active_jobs, &status).await;
        }
    });
}

/// Mark every active job failed, then exit. The flush is bounded so a
/// dead status store cannot stall the shutdown.
async fn flush_and_exit(code: InterruptCode, active_jobs: &ActiveJobs, status: &StatusRepo) {
    let jobs = active_jobs.snapshot();
    let message = code.error_string();

    let flush = async {
        for upload_id in &jobs {
            if let Err(e) = status.fail(upload_id, &message).await {
                error!(upload_id = %upload_id, step = "shutdown_flush", "Failed to flush error status: {}", e);
            }
        }
    };

    if tokio::time::timeout(FLUSH_BUDGET, flush).await.is_err() {
        error!("Status flush exceeded {:?}, exiting anyway", FLUSH_BUDGET);
    }

    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_drop() {
        let jobs = ActiveJobs::new();
        {
            let _guard = jobs.register("up-1");
            let _guard2 = jobs.register("up-2");
            let mut snapshot = jobs.snapshot();
            snapshot.sort();
            assert_eq!(snapshot, vec!["up-1".to_string(), "up-2".to_string()]);
        }
        assert!(jobs.snapshot().is_empty());
    }
}
