//! Speech-to-text client.
//!
//! One request per VAD chunk: multipart upload with fixed parameters
//! (Japanese language hint, verbose JSON response, temperature 0). The
//! response carries model-local timestamps that callers shift by the
//! chunk's start time.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use vscribe_models::TranscriptSegment;

use crate::error::{WorkerError, WorkerResult};

/// Fixed transcription parameters.
const MODEL: &str = "whisper-1";
const LANGUAGE: &str = "ja";
const RESPONSE_FORMAT: &str = "verbose_json";

#[derive(Debug, Deserialize)]
struct VerboseResponse {
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

/// Speech API client.
#[derive(Clone)]
pub struct WhisperClient {
    http: Client,
    api_key: String,
    api_base: String,
}

impl WhisperClient {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
            api_key: api_key.into(),
            api_base: api_base.into(),
        }
    }

    /// Transcribe one chunk file.
    ///
    /// Returned segments carry chunk-local timestamps; the caller adds
    /// the chunk's absolute start time and index.
    pub async fn transcribe_chunk(&self, audio_path: &Path) -> WorkerResult<Vec<TranscriptSegment>> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "chunk.mp3".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| WorkerError::SpeechNetwork(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", MODEL)
            .text("language", LANGUAGE)
            .text("response_format", RESPONSE_FORMAT)
            .text("temperature", "0");

        let url = format!("{}/audio/transcriptions", self.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WorkerError::SpeechNetwork(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response.text().await.unwrap_or_default();
            return Err(WorkerError::SpeechHttp {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        let parsed: VerboseResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::SpeechNetwork(format!("bad response body: {}", e)))?;

        let segments = parsed
            .segments
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| TranscriptSegment {
                timestamp: s.start,
                duration: (s.end - s.start).max(0.0),
                text: s.text.trim().to_string(),
                confidence: confidence_from_logprob(s.avg_logprob),
                chunk_index: None,
            })
            .collect::<Vec<_>>();

        debug!(segments = segments.len(), "Transcription chunk complete");
        Ok(segments)
    }
}

/// Map the model's average log-probability to a 0-1 confidence.
fn confidence_from_logprob(avg_logprob: Option<f64>) -> f64 {
    match avg_logprob {
        Some(lp) => lp.exp().clamp(0.0, 1.0),
        None => 1.0,
    }
}

/// Shift chunk-local segments to absolute video time.
pub fn shift_to_absolute(
    mut segments: Vec<TranscriptSegment>,
    chunk_start: f64,
    chunk_index: u32,
) -> Vec<TranscriptSegment> {
    for segment in &mut segments {
        segment.timestamp += chunk_start;
        segment.chunk_index = Some(chunk_index);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_transcribe_parses_segments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task": "transcribe",
                "language": "japanese",
                "duration": 3.2,
                "text": "hello world",
                "segments": [
                    {"id": 0, "start": 0.5, "end": 1.5, "text": " hello world ", "avg_logprob": -0.1},
                    {"id": 1, "start": 1.5, "end": 2.0, "text": "  ", "avg_logprob": -0.2}
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("chunk_0000.mp3");
        std::fs::write(&audio, b"mp3bytes").unwrap();

        let client = WhisperClient::new("key", server.uri());
        let segments = client.transcribe_chunk(&audio).await.unwrap();

        // Blank segments are dropped
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello world");
        assert!((segments[0].timestamp - 0.5).abs() < 1e-9);
        assert!(segments[0].confidence > 0.9);
    }

    #[tokio::test]
    async fn test_http_error_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "7")
                    .set_body_string("rate limited"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("chunk_0000.mp3");
        std::fs::write(&audio, b"mp3bytes").unwrap();

        let client = WhisperClient::new("key", server.uri());
        let err = client.transcribe_chunk(&audio).await.unwrap_err();
        assert!(err.is_speech_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_confidence_mapping() {
        assert!((confidence_from_logprob(Some(0.0)) - 1.0).abs() < 1e-9);
        assert!(confidence_from_logprob(Some(-1.0)) < 0.4);
        assert_eq!(confidence_from_logprob(None), 1.0);
    }

    #[test]
    fn test_shift_to_absolute() {
        let segments = vec![TranscriptSegment {
            timestamp: 0.5,
            duration: 1.0,
            text: "a".into(),
            confidence: 0.9,
            chunk_index: None,
        }];
        let shifted = shift_to_absolute(segments, 42.0, 3);
        assert!((shifted[0].timestamp - 42.5).abs() < 1e-9);
        assert_eq!(shifted[0].chunk_index, Some(3));
    }
}
