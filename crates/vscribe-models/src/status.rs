//! Job status row and progress vocabulary.
//!
//! The status store holds one row per job keyed by `upload_id`. Column
//! names are snake_case; API responses render the same fields in
//! camelCase (a straight identity mapping with case conversion).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds without an `updated_at` touch after which a `processing` row
/// is considered dead by readers.
pub const STALE_THRESHOLD_SECS: i64 = 300;

/// Coarse job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    #[default]
    Pending,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Pending => "pending",
            StatusKind::Downloading => "downloading",
            StatusKind::Processing => "processing",
            StatusKind::Completed => "completed",
            StatusKind::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusKind::Completed | StatusKind::Error)
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline phase: 1 audio, 2 visual, 3 report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    Audio,
    Visual,
    Report,
}

impl Phase {
    pub fn number(&self) -> u8 {
        match self {
            Phase::Audio => 1,
            Phase::Visual => 2,
            Phase::Report => 3,
        }
    }

    /// Overall progress band `[start, end]` owned by this phase.
    pub fn progress_band(&self) -> (u8, u8) {
        match self {
            Phase::Audio => (0, 45),
            Phase::Visual => (45, 85),
            Phase::Report => (85, 100),
        }
    }

    /// Map phase-local progress (0-100) into the overall scale.
    pub fn overall_progress(&self, phase_progress: u8) -> u8 {
        let (start, end) = self.progress_band();
        let span = (end - start) as u32;
        start + ((phase_progress.min(100) as u32 * span) / 100) as u8
    }
}

impl From<Phase> for u8 {
    fn from(p: Phase) -> u8 {
        p.number()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Phase::Audio),
            2 => Ok(Phase::Visual),
            3 => Ok(Phase::Report),
            other => Err(format!("invalid phase {}", other)),
        }
    }
}

/// Per-phase lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Waiting => "waiting",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

/// Fine-grained stage label shown to pollers.
///
/// This is the authoritative vocabulary; it matches the database column
/// values one-for-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Downloading,
    Compressing,
    Metadata,
    Audio,
    AudioSkipped,
    VadWhisper,
    LuminanceDetection,
    TextStabilization,
    SceneDetection,
    FrameExtraction,
    MultiFrameOcr,
    OcrProcessing,
    OcrCompleted,
    BatchProcessing,
    NarrationMapping,
    ExcelGeneration,
    UploadResult,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::Compressing => "compressing",
            Stage::Metadata => "metadata",
            Stage::Audio => "audio",
            Stage::AudioSkipped => "audio_skipped",
            Stage::VadWhisper => "vad_whisper",
            Stage::LuminanceDetection => "luminance_detection",
            Stage::TextStabilization => "text_stabilization",
            Stage::SceneDetection => "scene_detection",
            Stage::FrameExtraction => "frame_extraction",
            Stage::MultiFrameOcr => "multi_frame_ocr",
            Stage::OcrProcessing => "ocr_processing",
            Stage::OcrCompleted => "ocr_completed",
            Stage::BatchProcessing => "batch_processing",
            Stage::NarrationMapping => "narration_mapping",
            Stage::ExcelGeneration => "excel_generation",
            Stage::UploadResult => "upload_result",
            Stage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary metadata written once at job completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessingMetadata {
    pub duration_sec: f64,
    pub segment_count: u32,
    pub ocr_result_count: u32,
    pub transcription_length_chars: u32,
    pub total_scenes: u32,
    pub scenes_with_ocr: u32,
    pub scenes_with_narration: u32,
    pub detection_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_r2_key: Option<String>,
}

/// One row in the status store, keyed by `upload_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusRow {
    pub upload_id: String,
    pub user_id: String,
    pub file_name: String,
    pub status: StatusKind,
    /// Overall progress, 0-100, monotonically non-decreasing per job
    pub progress: u8,
    pub phase: Phase,
    /// Progress within the current phase, 0-100
    pub phase_progress: u8,
    pub phase_status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Free text shown to the user under the progress bar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProcessingMetadata>,
    /// Set only on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusRow {
    /// Fresh `pending` row for a newly accepted job.
    pub fn pending(upload_id: impl Into<String>, user_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            upload_id: upload_id.into(),
            user_id: user_id.into(),
            file_name: file_name.into(),
            status: StatusKind::Pending,
            progress: 0,
            phase: Phase::Audio,
            phase_progress: 0,
            phase_status: PhaseStatus::Waiting,
            stage: None,
            sub_task: None,
            estimated_time_remaining: None,
            started_at: now,
            updated_at: now,
            result_key: None,
            metadata: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reader-side staleness check: a `processing` row whose
    /// `updated_at` has not moved for five minutes belongs to a dead
    /// worker. The row itself is never mutated by readers.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == StatusKind::Processing
            && (now - self.updated_at).num_seconds() > STALE_THRESHOLD_SECS
    }
}

/// Cause of a worker-side interruption, mapped to a lay-person message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptCode {
    ServerShutdown,
    ManualStop,
    ResourceLimit,
    UncaughtException,
    UnknownSignal,
}

impl InterruptCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptCode::ServerShutdown => "SERVER_SHUTDOWN",
            InterruptCode::ManualStop => "MANUAL_STOP",
            InterruptCode::ResourceLimit => "RESOURCE_LIMIT",
            InterruptCode::UncaughtException => "UNCAUGHT_EXCEPTION",
            InterruptCode::UnknownSignal => "UNKNOWN_SIGNAL",
        }
    }

    /// End-user-readable message. The UI pattern-matches these to tell
    /// infrastructure interruptions apart from user errors.
    pub fn user_message(&self) -> &'static str {
        match self {
            InterruptCode::ServerShutdown => {
                "Processing was interrupted by server maintenance or scaling. Please try again."
            }
            InterruptCode::ManualStop => "Processing was stopped by an operator. Please try again.",
            InterruptCode::ResourceLimit => {
                "Processing hit a resource limit on the server. Please try again with a shorter video."
            }
            InterruptCode::UncaughtException => {
                "Processing stopped unexpectedly. Please try again."
            }
            InterruptCode::UnknownSignal => "Processing stopped unexpectedly. Please try again.",
        }
    }

    /// Full error string written to the status row: `CODE: message`.
    pub fn error_string(&self) -> String {
        format!("{}: {}", self.as_str(), self.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!StatusKind::Pending.is_terminal());
        assert!(!StatusKind::Processing.is_terminal());
        assert!(StatusKind::Completed.is_terminal());
        assert!(StatusKind::Error.is_terminal());
    }

    #[test]
    fn test_phase_serde_roundtrip() {
        let json = serde_json::to_string(&Phase::Visual).unwrap();
        assert_eq!(json, "2");
        let p: Phase = serde_json::from_str("3").unwrap();
        assert_eq!(p, Phase::Report);
        assert!(serde_json::from_str::<Phase>("4").is_err());
    }

    #[test]
    fn test_phase_progress_bands() {
        assert_eq!(Phase::Audio.overall_progress(0), 0);
        assert_eq!(Phase::Audio.overall_progress(100), 45);
        assert_eq!(Phase::Visual.overall_progress(0), 45);
        assert_eq!(Phase::Visual.overall_progress(50), 65);
        assert_eq!(Phase::Report.overall_progress(100), 100);
        // Over-range local progress is clamped
        assert_eq!(Phase::Report.overall_progress(150), 100);
    }

    #[test]
    fn test_phase_ordering() {
        assert!(Phase::Audio < Phase::Visual);
        assert!(Phase::Visual < Phase::Report);
    }

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(Stage::VadWhisper.as_str(), "vad_whisper");
        assert_eq!(Stage::MultiFrameOcr.as_str(), "multi_frame_ocr");
        let s: Stage = serde_json::from_str("\"luminance_detection\"").unwrap();
        assert_eq!(s, Stage::LuminanceDetection);
    }

    #[test]
    fn test_staleness() {
        let mut row = JobStatusRow::pending("up-1", "u1", "a.mp4");
        let now = Utc::now();

        // Not processing: never stale
        row.updated_at = now - chrono::Duration::seconds(600);
        assert!(!row.is_stale(now));

        row.status = StatusKind::Processing;
        assert!(row.is_stale(now));

        row.updated_at = now - chrono::Duration::seconds(60);
        assert!(!row.is_stale(now));
    }

    #[test]
    fn test_interrupt_messages() {
        let err = InterruptCode::ServerShutdown.error_string();
        assert!(err.starts_with("SERVER_SHUTDOWN:"));
        assert!(err.contains("maintenance or scaling"));
    }

    #[test]
    fn test_row_serde_snake_case() {
        let row = JobStatusRow::pending("up-1", "u1", "a.mp4");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["upload_id"], "up-1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["phase"], 1);
        assert_eq!(json["phase_status"], "waiting");
        assert!(json.get("result_key").is_none());
    }
}
