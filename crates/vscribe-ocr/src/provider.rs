//! OCR provider capability and adaptive cooldown.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::OcrResult;

/// Result of one OCR call.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    pub text: String,
    pub confidence: f64,
    pub provider: String,
    pub processing_time_ms: u64,
}

/// The single capability every OCR provider exposes.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Selection priority; lower is tried first.
    fn priority(&self) -> u8;

    /// Run OCR over PNG bytes.
    async fn perform_ocr(&self, image: &[u8]) -> OcrResult<OcrOutcome>;
}

/// Cooldown ladder applied on consecutive retryable failures.
const COOLDOWN_LADDER: [Duration; 4] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(300),
];

/// Per-provider availability state.
///
/// Consecutive retryable failures walk the cooldown ladder; success
/// resets it. A server `Retry-After` larger than the scheduled
/// cooldown overrides it.
#[derive(Debug, Default)]
pub struct Cooldown {
    state: Mutex<CooldownState>,
}

#[derive(Debug, Default)]
struct CooldownState {
    consecutive_failures: u32,
    unavailable_until: Option<Instant>,
}

impl Cooldown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        let state = self.state.lock().expect("cooldown lock poisoned");
        match state.unavailable_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    /// When the provider next becomes available, if it is cooling down.
    pub fn available_at(&self) -> Option<Instant> {
        let state = self.state.lock().expect("cooldown lock poisoned");
        state
            .unavailable_until
            .filter(|&until| until > Instant::now())
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("cooldown lock poisoned");
        state.consecutive_failures = 0;
        state.unavailable_until = None;
    }

    /// Record a retryable failure and return the applied cooldown.
    pub fn record_failure(&self, retry_after: Option<Duration>) -> Duration {
        let mut state = self.state.lock().expect("cooldown lock poisoned");
        let index = (state.consecutive_failures as usize).min(COOLDOWN_LADDER.len() - 1);
        state.consecutive_failures += 1;

        let mut cooldown = COOLDOWN_LADDER[index];
        if let Some(hint) = retry_after {
            if hint > cooldown {
                cooldown = hint;
            }
        }

        state.unavailable_until = Some(Instant::now() + cooldown);
        cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_ladder() {
        let cooldown = Cooldown::new();
        assert!(cooldown.is_available());

        assert_eq!(cooldown.record_failure(None), Duration::from_secs(30));
        assert!(!cooldown.is_available());

        assert_eq!(cooldown.record_failure(None), Duration::from_secs(60));
        assert_eq!(cooldown.record_failure(None), Duration::from_secs(120));
        assert_eq!(cooldown.record_failure(None), Duration::from_secs(300));
        // Ladder saturates at five minutes
        assert_eq!(cooldown.record_failure(None), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_ladder() {
        let cooldown = Cooldown::new();
        cooldown.record_failure(None);
        cooldown.record_failure(None);
        cooldown.record_success();
        assert!(cooldown.is_available());
        assert_eq!(cooldown.record_failure(None), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_overrides_when_larger() {
        let cooldown = Cooldown::new();
        let applied = cooldown.record_failure(Some(Duration::from_secs(120)));
        assert_eq!(applied, Duration::from_secs(120));

        // Smaller hints do not shorten the scheduled cooldown
        let cooldown = Cooldown::new();
        let applied = cooldown.record_failure(Some(Duration::from_secs(5)));
        assert_eq!(applied, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires() {
        let cooldown = Cooldown::new();
        cooldown.record_failure(None);
        assert!(!cooldown.is_available());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cooldown.is_available());
        assert!(cooldown.available_at().is_none());
    }
}
