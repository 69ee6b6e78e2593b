//! Worker error taxonomy.
//!
//! Errors fall into three tiers the retry loops branch on statically:
//! - transient: worth retrying inside the worker
//! - step-level: skip the unit (one chunk, one frame) and continue
//! - job-fatal: end the job with a terminal `error` status
//!
//! A separate question is whether the task queue should retry the whole
//! request: `is_queue_retryable` answers that.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Speech API returned {status}: {message}")]
    SpeechHttp {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Speech API request failed: {0}")]
    SpeechNetwork(String),

    #[error("Invalid audio for chunk {chunk_index}: {message}")]
    InvalidChunkAudio { chunk_index: u32, message: String },

    #[error("Status store unwritable: {0}")]
    StatusUnwritable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Quota check failed: {0}")]
    QuotaCheckFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vscribe_storage::StorageError),

    #[error("Status store error: {0}")]
    Status(#[from] vscribe_status::StatusError),

    #[error("Media error: {0}")]
    Media(#[from] vscribe_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vscribe_queue::QueueError),

    #[error("OCR error: {0}")]
    Ocr(#[from] vscribe_ocr::OcrError),

    #[error("Report error: {0}")]
    Report(#[from] vscribe_report::ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the speech call may be retried for this chunk.
    pub fn is_speech_retryable(&self) -> bool {
        match self {
            WorkerError::SpeechHttp { status, message, .. } => {
                matches!(status, 429 | 500 | 502 | 503) || {
                    let msg = message.to_lowercase();
                    msg.contains("overloaded") || msg.contains("quota")
                }
            }
            WorkerError::SpeechNetwork(_) => true,
            WorkerError::Media(vscribe_media::MediaError::Timeout(_)) => true,
            _ => false,
        }
    }

    /// Server-provided `Retry-After` hint, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            WorkerError::SpeechHttp { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the whole worker request should surface 500 so the task
    /// queue redelivers it. Deterministic job failures return false:
    /// the job was already marked failed and retrying cannot help.
    pub fn is_queue_retryable(&self) -> bool {
        match self {
            WorkerError::DownloadFailed(_)
            | WorkerError::Storage(_)
            | WorkerError::Status(_)
            | WorkerError::StatusUnwritable(_)
            | WorkerError::Queue(_)
            | WorkerError::SpeechNetwork(_)
            | WorkerError::Io(_) => true,
            WorkerError::Media(e) => matches!(e, vscribe_media::MediaError::Timeout(_)),
            WorkerError::Ocr(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_retry_classification() {
        let rate_limited = WorkerError::SpeechHttp {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(10)),
        };
        assert!(rate_limited.is_speech_retryable());
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(10)));

        let bad_audio = WorkerError::InvalidChunkAudio {
            chunk_index: 3,
            message: "unsupported format".into(),
        };
        assert!(!bad_audio.is_speech_retryable());

        let auth = WorkerError::SpeechHttp {
            status: 401,
            message: "bad key".into(),
            retry_after: None,
        };
        assert!(!auth.is_speech_retryable());
    }

    #[test]
    fn test_queue_retry_classification() {
        assert!(WorkerError::download_failed("net").is_queue_retryable());
        assert!(!WorkerError::processing_failed("undecodable").is_queue_retryable());
        assert!(
            WorkerError::Media(vscribe_media::MediaError::Timeout(300)).is_queue_retryable()
        );
        assert!(!WorkerError::Media(vscribe_media::MediaError::InvalidVideo("x".into()))
            .is_queue_retryable());
    }
}
