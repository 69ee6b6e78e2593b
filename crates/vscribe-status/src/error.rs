//! Status store error types.

use thiserror::Error;

pub type StatusResult<T> = Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatusError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Transient errors worth retrying: network failures and server
    /// 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            StatusError::Network(_) => true,
            StatusError::RequestFailed(msg) => {
                msg.contains("500") || msg.contains("502") || msg.contains("503")
            }
            _ => false,
        }
    }
}
