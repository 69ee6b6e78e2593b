//! Combined concurrency + sliding-window rate limiter.
//!
//! One primitive bounds three things at once:
//! - in-flight calls, via a counting semaphore;
//! - total calls per window, via a sliding-window timestamp log;
//! - burstiness, via a minimum inter-request spacing of
//!   `window / max_per_window`.
//!
//! Acquire waits until all three admit. Release returns only the
//! semaphore permit; window entries age out on their own.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Limiter tuning.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum in-flight calls
    pub max_concurrent: usize,
    /// Maximum calls per sliding window
    pub max_per_window: usize,
    pub window: Duration,
    /// Retry attempts beyond the first in `execute_with_retry`
    pub max_retries: u32,
    /// Base backoff delay, doubled per attempt
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each backoff
    pub max_jitter: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_per_window: 100,
            window: Duration::from_secs(60),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RateLimiterConfig {
    /// Vision API limits: 10 concurrent, 100 per minute.
    pub fn vision() -> Self {
        Self::default()
    }

    /// Speech API limits: 5 concurrent, 50 per minute, 5 retries.
    pub fn speech() -> Self {
        Self {
            max_concurrent: 5,
            max_per_window: 50,
            max_retries: 5,
            ..Self::default()
        }
    }

    /// Minimum spacing between request starts.
    pub fn min_spacing(&self) -> Duration {
        self.window / self.max_per_window.max(1) as u32
    }
}

#[derive(Debug, Default)]
struct WindowState {
    /// Start times of requests within the current window
    starts: VecDeque<Instant>,
    last_start: Option<Instant>,
}

/// The combined limiter. Cheap to clone via `Arc`.
pub struct RateLimiter {
    name: &'static str,
    config: RateLimiterConfig,
    semaphore: Arc<Semaphore>,
    window: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(name: &'static str, config: RateLimiterConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            name,
            config,
            semaphore,
            window: Mutex::new(WindowState::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `f` under the limiter.
    pub async fn execute<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore closed");
        self.wait_for_window().await;
        f().await
    }

    /// Run `f` under the limiter with bounded retries.
    ///
    /// Backoff is `base * 2^attempt + jitter * random()`, overridden by
    /// the error's `Retry-After` hint when that is larger. Errors for
    /// which `is_retryable` returns false abort immediately.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        f: F,
        is_retryable: impl Fn(&E) -> bool,
        retry_after: impl Fn(&E) -> Option<Duration>,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            let result = self.execute(&f).await;
            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < self.config.max_retries => {
                    let mut delay = self.backoff_delay(attempt);
                    if let Some(hint) = retry_after(&e) {
                        if hint > delay {
                            delay = hint;
                        }
                    }
                    attempt += 1;
                    debug!(
                        limiter = self.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter = self
            .config
            .max_jitter
            .mul_f64(rand::rng().random::<f64>());
        base + jitter
    }

    /// Block until the sliding window and spacing rules admit a new
    /// request start, then record it.
    async fn wait_for_window(&self) {
        loop {
            let wait = {
                let mut state = self.window.lock().await;
                let now = Instant::now();

                while let Some(&front) = state.starts.front() {
                    if now.duration_since(front) >= self.config.window {
                        state.starts.pop_front();
                    } else {
                        break;
                    }
                }

                let mut until: Option<Instant> = None;

                if state.starts.len() >= self.config.max_per_window {
                    let front = *state.starts.front().expect("window is non-empty");
                    until = Some(front + self.config.window);
                }

                if let Some(last) = state.last_start {
                    let earliest = last + self.config.min_spacing();
                    if earliest > now {
                        until = Some(match until {
                            Some(t) => t.max(earliest),
                            None => earliest,
                        });
                    }
                }

                match until {
                    None => {
                        state.starts.push_back(now);
                        state.last_start = Some(now);
                        None
                    }
                    Some(t) => Some(t),
                }
            };

            match wait {
                None => return,
                Some(until) => tokio::time::sleep_until(until).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_min_spacing() {
        let config = RateLimiterConfig::vision();
        assert_eq!(config.min_spacing(), Duration::from_millis(600));

        let speech = RateLimiterConfig::speech();
        assert_eq!(speech.min_spacing(), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_enforced_between_calls() {
        let limiter = RateLimiter::new(
            "test",
            RateLimiterConfig {
                max_concurrent: 10,
                max_per_window: 10,
                window: Duration::from_secs(10),
                ..Default::default()
            },
        );

        let t0 = Instant::now();
        limiter.execute(|| async {}).await;
        limiter.execute(|| async {}).await;
        // min spacing = 1s, so the second call cannot start before +1s
        assert!(t0.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_limit_blocks_excess_calls() {
        let limiter = RateLimiter::new(
            "test",
            RateLimiterConfig {
                max_concurrent: 10,
                max_per_window: 2,
                window: Duration::from_secs(4),
                ..Default::default()
            },
        );

        let t0 = Instant::now();
        limiter.execute(|| async {}).await;
        limiter.execute(|| async {}).await;
        // Third call must wait for the first window entry to age out
        limiter.execute(|| async {}).await;
        assert!(t0.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let limiter = RateLimiter::new(
            "test",
            RateLimiterConfig {
                max_retries: 5,
                base_delay: Duration::from_millis(10),
                max_jitter: Duration::from_millis(1),
                max_per_window: 1000,
                window: Duration::from_secs(1),
                max_concurrent: 10,
            },
        );
        let calls = AtomicU32::new(0);

        let result = limiter
            .execute_with_retry(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient".to_string())
                        } else {
                            Ok(7u32)
                        }
                    }
                },
                |_| true,
                |_| None,
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_aborts() {
        let limiter = RateLimiter::new("test", RateLimiterConfig::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = limiter
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |_| false,
                |_| None,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_overrides_backoff() {
        let limiter = RateLimiter::new(
            "test",
            RateLimiterConfig {
                max_retries: 1,
                base_delay: Duration::from_millis(10),
                max_jitter: Duration::from_millis(1),
                max_per_window: 1000,
                window: Duration::from_secs(1),
                max_concurrent: 10,
            },
        );
        let calls = AtomicU32::new(0);
        let t0 = Instant::now();

        let _: Result<(), String> = limiter
            .execute_with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("429".to_string()) }
                },
                |_| true,
                |_| Some(Duration::from_secs(30)),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(t0.elapsed() >= Duration::from_secs(30));
    }
}
