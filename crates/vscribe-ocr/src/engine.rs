//! Priority-first provider selection with failover.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{OcrError, OcrResult};
use crate::provider::{Cooldown, OcrOutcome, OcrProvider};

/// Upper bound on one wait for a cooling-down provider pool.
const MAX_POOL_WAIT: Duration = Duration::from_secs(300);

/// How many times a single call will wait out a fully cooling pool
/// before giving up.
const MAX_POOL_WAIT_CYCLES: u32 = 3;

struct Slot {
    provider: Arc<dyn OcrProvider>,
    cooldown: Cooldown,
}

/// Provider pool: tries available providers priority-first, puts
/// retryably-failing ones into cooldown, and moves on to the next.
pub struct OcrEngine {
    slots: Vec<Slot>,
}

impl OcrEngine {
    pub fn new(mut providers: Vec<Arc<dyn OcrProvider>>) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self {
            slots: providers
                .into_iter()
                .map(|provider| Slot {
                    provider,
                    cooldown: Cooldown::new(),
                })
                .collect(),
        }
    }

    /// Run OCR with failover.
    ///
    /// When every provider is cooling down, the call sleeps until the
    /// earliest one recovers and tries again, so simultaneous rate
    /// limiting delays a job rather than failing it.
    pub async fn recognize(&self, image: &[u8]) -> OcrResult<OcrOutcome> {
        let mut pool_waits = 0u32;

        loop {
            for slot in &self.slots {
                if !slot.cooldown.is_available() {
                    continue;
                }

                match slot.provider.perform_ocr(image).await {
                    Ok(outcome) => {
                        slot.cooldown.record_success();
                        return Ok(outcome);
                    }
                    Err(e) if e.is_retryable() => {
                        let applied = slot.cooldown.record_failure(e.retry_after());
                        warn!(
                            provider = slot.provider.name(),
                            cooldown_secs = applied.as_secs(),
                            "OCR provider failed, cooling down: {}",
                            e
                        );
                    }
                    Err(e) => return Err(e),
                }
            }

            // Either nothing was available or every available provider
            // just failed into cooldown: wait for the earliest recovery.
            match self.earliest_recovery() {
                Some(at) if pool_waits < MAX_POOL_WAIT_CYCLES => {
                    pool_waits += 1;
                    let wait = at.saturating_duration_since(Instant::now()).min(MAX_POOL_WAIT);
                    info!(
                        wait_secs = wait.as_secs(),
                        "All OCR providers cooling down, waiting for recovery"
                    );
                    tokio::time::sleep(wait).await;
                }
                _ => return Err(OcrError::AllProvidersUnavailable),
            }
        }
    }

    /// Names of currently available providers, priority order.
    pub fn available_providers(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| s.cooldown.is_available())
            .map(|s| s.provider.name())
            .collect()
    }

    fn earliest_recovery(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|s| s.cooldown.available_at())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails retryably N times, then succeeds.
    struct FlakyProvider {
        name: String,
        priority: u8,
        failures_left: AtomicU32,
        retry_after: Option<Duration>,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(name: &str, priority: u8, failures: u32, retry_after: Option<Duration>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                priority,
                failures_left: AtomicU32::new(failures),
                retry_after,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl OcrProvider for FlakyProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn perform_ocr(&self, _image: &[u8]) -> OcrResult<OcrOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(OcrError::provider_http(
                    &self.name,
                    429,
                    "rate limited",
                    self.retry_after,
                ));
            }
            Ok(OcrOutcome {
                text: format!("from {}", self.name),
                confidence: 0.9,
                provider: self.name.clone(),
                processing_time_ms: 5,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order() {
        let primary = FlakyProvider::new("primary", 1, 0, None);
        let secondary = FlakyProvider::new("secondary", 2, 0, None);
        let engine = OcrEngine::new(vec![secondary.clone(), primary.clone()]);

        let out = engine.recognize(b"png").await.unwrap();
        assert_eq!(out.provider, "primary");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_to_secondary() {
        let primary = FlakyProvider::new("primary", 1, 2, Some(Duration::from_secs(120)));
        let secondary = FlakyProvider::new("secondary", 2, 0, None);
        let engine = OcrEngine::new(vec![primary.clone(), secondary.clone()]);

        // First two calls: primary 429s, secondary serves them
        let out1 = engine.recognize(b"png").await.unwrap();
        assert_eq!(out1.provider, "secondary");
        let out2 = engine.recognize(b"png").await.unwrap();
        assert_eq!(out2.provider, "secondary");

        // Primary was only hit once: it is cooling down for >= 120s
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.available_providers(), vec!["secondary"]);

        // After the Retry-After window the primary recovers
        tokio::time::advance(Duration::from_secs(121)).await;
        let out3 = engine.recognize(b"png").await.unwrap();
        assert_eq!(out3.provider, "secondary");
        // primary fails once more (second scheduled failure), cooldown again
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_waits_out_cooldowns() {
        let only = FlakyProvider::new("only", 1, 1, None);
        let engine = OcrEngine::new(vec![only.clone()]);

        // First attempt fails, engine waits out the 30s cooldown and
        // then succeeds; paused time advances automatically.
        let out = engine.recognize(b"png").await.unwrap();
        assert_eq!(out.provider, "only");
        assert_eq!(only.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates() {
        struct BadKey;
        #[async_trait]
        impl OcrProvider for BadKey {
            fn name(&self) -> &str {
                "bad"
            }
            fn priority(&self) -> u8 {
                1
            }
            async fn perform_ocr(&self, _image: &[u8]) -> OcrResult<OcrOutcome> {
                Err(OcrError::provider_http("bad", 401, "invalid key", None))
            }
        }

        let engine = OcrEngine::new(vec![Arc::new(BadKey)]);
        let err = engine.recognize(b"png").await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
