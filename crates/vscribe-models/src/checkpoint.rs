//! Durable per-job checkpoint for mid-job resumption.
//!
//! The checkpoint records which long-running step the job reached and
//! which OCR scene indices are complete, so a retried batch request can
//! skip work that already happened. Created when the first long step
//! starts, updated at each batch boundary, deleted when the job reaches
//! a terminal state, and garbage-collected daily after `expires_at`.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint retention after the last update.
pub const CHECKPOINT_TTL_HOURS: i64 = 24;

/// The long-running step a job last reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStep {
    Download,
    Audio,
    SceneDetect,
    Ocr,
    Excel,
}

impl CheckpointStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStep::Download => "download",
            CheckpointStep::Audio => "audio",
            CheckpointStep::SceneDetect => "scene_detect",
            CheckpointStep::Ocr => "ocr",
            CheckpointStep::Excel => "excel",
        }
    }
}

/// Per-job durable resume state, keyed by `upload_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub upload_id: String,
    pub current_step: CheckpointStep,
    pub total_scenes: u32,
    /// Sorted set of completed OCR scene indices (zero-based)
    #[serde(default)]
    pub completed_ocr_scenes: BTreeSet<u32>,
    #[serde(default)]
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Checkpoint {
    /// New checkpoint at the given step.
    pub fn new(upload_id: impl Into<String>, step: CheckpointStep) -> Self {
        let now = Utc::now();
        Self {
            upload_id: upload_id.into(),
            current_step: step,
            total_scenes: 0,
            completed_ocr_scenes: BTreeSet::new(),
            retry_count: 0,
            updated_at: now,
            expires_at: now + Duration::hours(CHECKPOINT_TTL_HOURS),
        }
    }

    /// Advance to a later step and refresh timestamps.
    pub fn advance(&mut self, step: CheckpointStep) {
        self.current_step = step;
        self.touch();
    }

    /// Record a completed range of OCR scene indices.
    pub fn record_ocr_scenes(&mut self, range: std::ops::Range<u32>) {
        self.completed_ocr_scenes.extend(range);
        self.touch();
    }

    /// Scene indices in `range` that still need OCR.
    pub fn pending_in_range(&self, range: std::ops::Range<u32>) -> Vec<u32> {
        range
            .filter(|i| !self.completed_ocr_scenes.contains(i))
            .collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.expires_at = self.updated_at + Duration::hours(CHECKPOINT_TTL_HOURS);
    }
}
