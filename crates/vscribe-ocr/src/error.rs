//! OCR error types and retryability classification.

use std::time::Duration;

use thiserror::Error;

pub type OcrResult<T> = Result<T, OcrError>;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Provider {provider} returned {status}: {message}")]
    ProviderHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} request failed: {message}")]
    ProviderNetwork { provider: String, message: String },

    #[error("Provider {provider} response unusable: {message}")]
    BadResponse { provider: String, message: String },

    #[error("All OCR providers unavailable")]
    AllProvidersUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OcrError {
    pub fn provider_http(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::ProviderHttp {
            provider: provider.into(),
            status,
            message: message.into(),
            retry_after,
        }
    }

    pub fn provider_network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderNetwork {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn bad_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the failure warrants trying again (on this provider or
    /// the next one): rate limiting, overload, quota, timeout, network.
    pub fn is_retryable(&self) -> bool {
        match self {
            OcrError::ProviderHttp { status, message, .. } => {
                matches!(status, 429 | 500 | 502 | 503) || {
                    let msg = message.to_lowercase();
                    msg.contains("overloaded") || msg.contains("quota")
                }
            }
            OcrError::ProviderNetwork { .. } => true,
            OcrError::AllProvidersUnavailable => true,
            OcrError::BadResponse { .. } | OcrError::Config(_) => false,
        }
    }

    /// Server-provided `Retry-After` hint, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OcrError::ProviderHttp { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(OcrError::provider_http("p", 429, "slow down", None).is_retryable());
        assert!(OcrError::provider_http("p", 503, "unavailable", None).is_retryable());
        assert!(!OcrError::provider_http("p", 401, "bad key", None).is_retryable());
    }

    #[test]
    fn test_retryable_messages() {
        assert!(OcrError::provider_http("p", 400, "model overloaded", None).is_retryable());
        assert!(OcrError::provider_http("p", 403, "Quota exceeded", None).is_retryable());
        assert!(OcrError::provider_network("p", "connection reset").is_retryable());
    }

    #[test]
    fn test_bad_response_not_retryable() {
        assert!(!OcrError::bad_response("p", "no candidates").is_retryable());
    }

    #[test]
    fn test_retry_after_passthrough() {
        let e = OcrError::provider_http("p", 429, "x", Some(Duration::from_secs(120)));
        assert_eq!(e.retry_after(), Some(Duration::from_secs(120)));
        assert_eq!(OcrError::provider_network("p", "x").retry_after(), None);
    }
}
