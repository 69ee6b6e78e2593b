//! Gemini vision providers.
//!
//! Three providers share this implementation and differ only in model
//! and priority. Requests go through the shared vision rate limiter;
//! transient HTTP failures are retried there before failover kicks in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OcrError, OcrResult};
use crate::limiter::RateLimiter;
use crate::parse::parse_ocr_response;
use crate::provider::{OcrOutcome, OcrProvider};

/// The OCR prompt. The wording is part of the behavioral contract with
/// the model; do not edit casually.
pub const OCR_PROMPT: &str = "\
Extract the primary on-screen text from this video frame.

Rules:
1. Only look at subtitles, captions, and titles in the bottom 20% region or the center 30% region of the frame.
2. Ignore background text, signage, channel logos, and watermarks.
3. Respond with strict JSON only, in exactly this shape: {\"text\": string, \"confidence\": number}
4. \"confidence\" is your confidence in the extraction from 0.0 to 1.0.
5. If no subtitle, caption, or title text is visible, return {\"text\": \"\", \"confidence\": 0.0}.
6. Preserve line breaks inside the text with \\n.";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    InlineData(InlineData),
    Text(String),
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// One Gemini model behind the `OcrProvider` capability.
pub struct GeminiOcrProvider {
    name: String,
    model: String,
    priority: u8,
    api_key: String,
    api_base: String,
    http: Client,
    limiter: Arc<RateLimiter>,
}

impl GeminiOcrProvider {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        priority: u8,
        api_key: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            priority,
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            http: Client::new(),
            limiter,
        }
    }

    /// Override the API base URL (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// The standard three-provider pool, priority-ordered.
    pub fn default_pool(api_key: &str, limiter: Arc<RateLimiter>) -> Vec<Arc<dyn OcrProvider>> {
        vec![
            Arc::new(Self::new(
                "gemini-flash",
                "gemini-2.5-flash",
                1,
                api_key,
                limiter.clone(),
            )),
            Arc::new(Self::new(
                "gemini-flash-lite",
                "gemini-2.5-flash-lite",
                2,
                api_key,
                limiter.clone(),
            )),
            Arc::new(Self::new(
                "gemini-pro",
                "gemini-2.5-pro",
                3,
                api_key,
                limiter,
            )),
        ]
    }

    async fn call_api(&self, image: &[u8]) -> OcrResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData(InlineData {
                        mime_type: "image/png".to_string(),
                        data: BASE64.encode(image),
                    }),
                    Part::Text(OCR_PROMPT.to_string()),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::provider_network(&self.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::provider_http(
                &self.name,
                status.as_u16(),
                body,
                retry_after,
            ));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| OcrError::bad_response(&self.name, e.to_string()))?;

        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| OcrError::bad_response(&self.name, "no candidates in response"))
    }
}

#[async_trait::async_trait]
impl OcrProvider for GeminiOcrProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn perform_ocr(&self, image: &[u8]) -> OcrResult<OcrOutcome> {
        let started = Instant::now();

        let raw = self
            .limiter
            .execute_with_retry(
                || self.call_api(image),
                OcrError::is_retryable,
                OcrError::retry_after,
            )
            .await?;

        let parsed = parse_ocr_response(&raw);
        debug!(
            provider = %self.name,
            chars = parsed.text.len(),
            "OCR call complete"
        );

        Ok(OcrOutcome {
            text: parsed.text,
            confidence: parsed.confidence,
            provider: self.name.clone(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Parse a `Retry-After` header (seconds form).
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimiterConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            "vision-test",
            RateLimiterConfig {
                max_per_window: 10_000,
                window: Duration::from_secs(1),
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_jitter: Duration::from_millis(1),
                max_concurrent: 10,
            },
        ))
    }

    fn provider(server: &MockServer) -> GeminiOcrProvider {
        GeminiOcrProvider::new("gemini-flash", "gemini-2.5-flash", 1, "key", fast_limiter())
            .with_api_base(server.uri())
    }

    fn gemini_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        })
    }

    #[tokio::test]
    async fn test_successful_ocr() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
                r#"{"text": "Breaking News", "confidence": 0.95}"#,
            )))
            .mount(&server)
            .await;

        let out = provider(&server).perform_ocr(b"fakepng").await.unwrap();
        assert_eq!(out.text, "Breaking News");
        assert!((out.confidence - 0.95).abs() < 1e-9);
        assert_eq!(out.provider, "gemini-flash");
    }

    #[tokio::test]
    async fn test_rate_limited_surfaces_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "120")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = provider(&server).perform_ocr(b"fakepng").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = provider(&server).perform_ocr(b"fakepng").await.unwrap_err();
        assert!(matches!(err, OcrError::BadResponse { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fenced_response_parsed_leniently() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
                "```json\n{\"text\": \"caption\", \"confidence\": 0.6}\n```",
            )))
            .mount(&server)
            .await;

        let out = provider(&server).perform_ocr(b"fakepng").await.unwrap();
        assert_eq!(out.text, "caption");
    }

    #[test]
    fn test_prompt_contract() {
        assert!(OCR_PROMPT.contains("bottom 20%"));
        assert!(OCR_PROMPT.contains("center 30%"));
        assert!(OCR_PROMPT.contains(r#"{"text": string, "confidence": number}"#));
        assert!(OCR_PROMPT.contains("logos"));
    }
}
