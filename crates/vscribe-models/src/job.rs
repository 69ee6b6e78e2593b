//! Job intake and batch-continuation payloads.

use serde::{Deserialize, Serialize};

/// Scene detection mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Multi-pass scene-cut detection only.
    #[default]
    Standard,
    /// Adds luminance-transition and text-stability detection plus
    /// multi-frame OCR per scene.
    Enhanced,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Standard => "standard",
            DetectionMode::Enhanced => "enhanced",
        }
    }
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /process` and `POST /process-task`.
///
/// `upload_id` is the job's immutable identity; duplicate submissions
/// overwrite the status row back to `pending` and enqueue a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Opaque, globally unique upload identifier
    pub upload_id: String,
    /// Object-store key of the uploaded source video
    pub r2_key: String,
    /// Original file name (used for the result artifact title)
    pub file_name: String,
    /// Owner of the upload
    pub user_id: String,
    /// Whether the user consented to data retention
    pub data_consent: bool,
    /// Detection mode; defaults to standard when omitted
    #[serde(default)]
    pub detection_mode: DetectionMode,
}

impl ProcessRequest {
    /// Name of the first required field that is empty, if any.
    ///
    /// Intake rejects with 400 when this returns `Some`.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.upload_id.is_empty() {
            Some("upload_id")
        } else if self.r2_key.is_empty() {
            Some("r2_key")
        } else if self.file_name.is_empty() {
            Some("file_name")
        } else if self.user_id.is_empty() {
            Some("user_id")
        } else {
            None
        }
    }
}

/// Job facts that batch continuations need but `BatchTask` does not
/// carry; persisted alongside the other transient state blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub upload_id: String,
    pub user_id: String,
    pub file_name: String,
    pub detection_mode: DetectionMode,
    pub data_consent: bool,
}

impl From<&ProcessRequest> for JobInfo {
    fn from(request: &ProcessRequest) -> Self {
        Self {
            upload_id: request.upload_id.clone(),
            user_id: request.user_id.clone(),
            file_name: request.file_name.clone(),
            detection_mode: request.detection_mode,
            data_consent: request.data_consent,
        }
    }
}

/// Body of `POST /process-ocr-batch`: one contiguous slice of scenes.
///
/// Batches are chained: each successful batch enqueues the next until
/// `is_last_batch`, which additionally triggers report assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTask {
    pub upload_id: String,
    pub user_id: String,
    /// Zero-based index of this batch
    pub batch_index: u32,
    pub total_batches: u32,
    pub batch_size: u32,
    /// First scene index (zero-based, inclusive)
    pub start_scene_index: u32,
    /// Last scene index (zero-based, exclusive)
    pub end_scene_index: u32,
    /// Object-store key of the source video
    pub video_key: String,
    /// Total video duration in seconds
    pub video_duration: f64,
    pub is_last_batch: bool,
}

impl BatchTask {
    /// Scene indices covered by this batch.
    pub fn scene_range(&self) -> std::ops::Range<u32> {
        self.start_scene_index..self.end_scene_index
    }
}
