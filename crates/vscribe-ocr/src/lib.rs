//! OCR subsystem: providers, failover, and rate limiting.
//!
//! Scene frames go to a vision model with a fixed prompt. Providers are
//! tried priority-first; retryable failures put a provider into an
//! adaptive cooldown and the next one is tried. All calls pass through
//! a shared rate limiter combining a concurrency semaphore, a sliding
//! per-minute window, and minimum inter-request spacing.

pub mod engine;
pub mod error;
pub mod gemini;
pub mod limiter;
pub mod multi_frame;
pub mod overlay;
pub mod parse;
pub mod provider;

pub use engine::OcrEngine;
pub use error::{OcrError, OcrResult};
pub use gemini::{GeminiOcrProvider, OCR_PROMPT};
pub use limiter::{RateLimiter, RateLimiterConfig};
pub use multi_frame::{normalize_text, select_first_stable};
pub use overlay::filter_persistent_overlays;
pub use provider::{OcrOutcome, OcrProvider};
