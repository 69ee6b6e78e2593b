//! Progress writing with coalescing, monotonicity, and heartbeats.
//!
//! Every status write funnels through here. In production a failed
//! write aborts the job (readers must never see a silently dead row);
//! in development it is logged and swallowed. Updates are coalesced:
//! a write goes out only when overall progress advances by at least
//! two points within a phase, or the stage or sub-task text changes.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use vscribe_models::{Phase, PhaseStatus, Stage, StatusKind};
use vscribe_status::status_repo::StatusUpdate;
use vscribe_status::StatusRepo;

use crate::error::{WorkerError, WorkerResult};

/// Minimum progress advance that forces a write.
const COALESCE_STEP: u8 = 2;

/// Heartbeat period while long steps run.
const HEARTBEAT_PERIOD_SECS: u64 = 60;

#[derive(Debug, Default)]
struct ProgressState {
    progress: u8,
    last_written_progress: u8,
    phase: Option<Phase>,
    stage: Option<Stage>,
    sub_task: Option<String>,
}

/// Per-job progress writer handed into the pipeline as a capability.
#[derive(Clone)]
pub struct ProgressWriter {
    repo: StatusRepo,
    upload_id: String,
    production: bool,
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressWriter {
    pub fn new(repo: StatusRepo, upload_id: impl Into<String>, production: bool) -> Self {
        Self {
            repo,
            upload_id: upload_id.into(),
            production,
            state: Arc::new(Mutex::new(ProgressState::default())),
        }
    }

    /// Seed this writer's monotonic floor without writing.
    ///
    /// Batch continuations run in fresh requests but must never move
    /// the row's progress backwards; the caller seeds the floor from
    /// the batch progress formula.
    pub async fn init_floor(&self, progress: u8) {
        let mut state = self.state.lock().await;
        state.progress = state.progress.max(progress);
        state.last_written_progress = state.progress;
    }

    /// Set the coarse status (`downloading`, `processing`, ...).
    pub async fn set_status(&self, status: StatusKind) -> WorkerResult<()> {
        self.write(StatusUpdate {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    /// Mark a phase as started.
    pub async fn phase_started(&self, phase: Phase) -> WorkerResult<()> {
        {
            let mut state = self.state.lock().await;
            state.phase = Some(phase);
        }
        self.write(StatusUpdate {
            phase: Some(phase),
            phase_progress: Some(0),
            phase_status: Some(PhaseStatus::InProgress),
            ..Default::default()
        })
        .await
    }

    /// Mark a phase as finished, pinning progress to at least the
    /// phase band's edge (never below the writer's floor).
    pub async fn phase_completed(&self, phase: Phase) -> WorkerResult<()> {
        let overall = self.advance_floor(phase.overall_progress(100)).await;
        self.write(StatusUpdate {
            progress: Some(overall),
            phase: Some(phase),
            phase_progress: Some(100),
            phase_status: Some(PhaseStatus::Completed),
            ..Default::default()
        })
        .await
    }

    /// Mark a phase as skipped (no-audio videos skip phase 1).
    pub async fn phase_skipped(&self, phase: Phase, stage: Stage) -> WorkerResult<()> {
        let overall = self.advance_floor(phase.overall_progress(100)).await;
        self.write(StatusUpdate {
            progress: Some(overall),
            phase: Some(phase),
            phase_progress: Some(100),
            phase_status: Some(PhaseStatus::Skipped),
            stage: Some(stage),
            ..Default::default()
        })
        .await
    }

    /// Report progress within the current phase.
    ///
    /// `phase_progress` is 0-100 local to the phase; the overall value
    /// is derived from the phase band and never decreases.
    pub async fn update(
        &self,
        phase_progress: u8,
        stage: Stage,
        sub_task: Option<String>,
    ) -> WorkerResult<()> {
        let (write_needed, overall, phase) = {
            let mut state = self.state.lock().await;
            let phase = state.phase.unwrap_or(Phase::Audio);
            let overall = phase.overall_progress(phase_progress).max(state.progress);
            state.progress = overall;

            let stage_changed = state.stage != Some(stage);
            let sub_task_changed = state.sub_task != sub_task;
            let progressed = overall >= state.last_written_progress.saturating_add(COALESCE_STEP);

            let write_needed = stage_changed || sub_task_changed || progressed;
            if write_needed {
                state.last_written_progress = overall;
                state.stage = Some(stage);
                state.sub_task = sub_task.clone();
            }
            (write_needed, overall, phase)
        };

        if !write_needed {
            return Ok(());
        }

        self.write(StatusUpdate {
            progress: Some(overall),
            phase: Some(phase),
            phase_progress: Some(phase_progress.min(100)),
            stage: Some(stage),
            sub_task,
            ..Default::default()
        })
        .await
    }

    /// Write an absolute overall progress value (batch continuation).
    pub async fn set_overall_progress(
        &self,
        progress: u8,
        stage: Stage,
        sub_task: Option<String>,
    ) -> WorkerResult<()> {
        let progress = {
            let mut state = self.state.lock().await;
            let clamped = progress.max(state.progress);
            state.progress = clamped;
            state.last_written_progress = clamped;
            state.stage = Some(stage);
            state.sub_task = sub_task.clone();
            clamped
        };
        self.write(StatusUpdate {
            progress: Some(progress),
            stage: Some(stage),
            sub_task,
            ..Default::default()
        })
        .await
    }

    /// Write a fresh time-remaining estimate.
    pub async fn set_eta(&self, eta: impl Into<String>) -> WorkerResult<()> {
        self.write(StatusUpdate {
            estimated_time_remaining: Some(eta.into()),
            ..Default::default()
        })
        .await
    }

    /// Spawn the heartbeat task; the returned guard aborts it on drop.
    pub fn start_heartbeat(&self) -> HeartbeatGuard {
        let repo = self.repo.clone();
        let upload_id = self.upload_id.clone();
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_PERIOD_SECS));
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = repo.heartbeat(&upload_id).await {
                    warn!(upload_id = %upload_id, step = "heartbeat", "Heartbeat write failed: {}", e);
                }
            }
        });
        HeartbeatGuard { handle }
    }

    async fn advance_floor(&self, overall: u8) -> u8 {
        let mut state = self.state.lock().await;
        state.progress = state.progress.max(overall);
        state.last_written_progress = state.progress;
        state.progress
    }

    async fn write(&self, update: StatusUpdate) -> WorkerResult<()> {
        match self.repo.update(&self.upload_id, update).await {
            Ok(()) => Ok(()),
            Err(e) if self.production => Err(WorkerError::StatusUnwritable(e.to_string())),
            Err(e) => {
                warn!(
                    upload_id = %self.upload_id,
                    step = "status_write",
                    "Status write failed (ignored in development): {}",
                    e
                );
                Ok(())
            }
        }
    }
}

/// Aborts the heartbeat task when dropped.
pub struct HeartbeatGuard {
    handle: JoinHandle<()>,
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Render an estimate the status page can show verbatim.
pub fn format_eta(seconds: u64) -> String {
    if seconds < 60 {
        "under a minute".to_string()
    } else {
        let minutes = seconds.div_ceil(60);
        format!("about {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    }
}

/// Map transferred bytes into the download progress band [10, 20].
pub fn download_progress(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 10;
    }
    let ratio = (transferred as f64 / total as f64).clamp(0.0, 1.0);
    10 + (ratio * 10.0) as u8
}
