//! Bounded retry for transient status-store failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{StatusError, StatusResult};

/// Retry behavior for store writes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry attempts beyond the initial one
    pub max_retries: u32,
    /// Base delay, doubled each attempt
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Run `operation`, retrying transient errors with exponential backoff.
///
/// Non-transient errors return immediately.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> StatusResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StatusResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_growth_is_capped() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_transient_errors_retry_until_success() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);

        let result = with_retry(&config, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StatusError::request_failed("got 503 from store"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_fast() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);

        let result: StatusResult<()> = with_retry(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StatusError::not_found("row")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
