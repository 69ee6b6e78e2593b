//! Worker configuration.

use std::path::PathBuf;

/// Which result sink the worker writes artifacts through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSinkKind {
    /// Local filesystem (development)
    Fs,
    /// Object store (production)
    R2,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// HTTP listen port
    pub port: u16,
    /// "development" or "production"
    pub environment: String,
    /// Shared secret for bearer-authenticated endpoints
    pub worker_secret: String,
    /// Vision API key
    pub gemini_api_key: String,
    /// Speech API key
    pub openai_api_key: String,
    /// Speech API base URL, overridable for tests
    pub speech_api_url: String,
    /// Quota service base URL; quota checks are skipped when unset
    pub quota_service_url: Option<String>,
    /// Where finished workbooks go
    pub result_sink: ResultSinkKind,
    /// Root directory for the filesystem sink
    pub result_dir: PathBuf,
    /// Root directory for per-job temp dirs
    pub work_dir: PathBuf,
    /// Scenes per OCR batch
    pub batch_size: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: "development".to_string(),
            worker_secret: String::new(),
            gemini_api_key: String::new(),
            openai_api_key: String::new(),
            speech_api_url: "https://api.openai.com/v1".to_string(),
            quota_service_url: None,
            result_sink: ResultSinkKind::Fs,
            result_dir: PathBuf::from("/tmp/vscribe/results"),
            work_dir: PathBuf::from("/tmp/vscribe"),
            batch_size: crate::batch::BATCH_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let default_sink = if environment == "production" {
            ResultSinkKind::R2
        } else {
            ResultSinkKind::Fs
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            worker_secret: std::env::var("WORKER_SECRET").unwrap_or_default(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            speech_api_url: std::env::var("SPEECH_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            quota_service_url: std::env::var("QUOTA_SERVICE_URL").ok(),
            result_sink: match std::env::var("RESULT_SINK").as_deref() {
                Ok("r2") => ResultSinkKind::R2,
                Ok("fs") => ResultSinkKind::Fs,
                _ => default_sink,
            },
            result_dir: std::env::var("RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/vscribe/results")),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/vscribe")),
            batch_size: std::env::var("OCR_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(crate::batch::BATCH_SIZE),
            environment,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Boot-time validation: every required variable must be present in
    /// production. Returns the missing names.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.worker_secret.is_empty() {
            missing.push("WORKER_SECRET");
        }
        if self.gemini_api_key.is_empty() {
            missing.push("GEMINI_API_KEY");
        }
        if self.openai_api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        for var in [
            "R2_ACCOUNT_ID",
            "R2_ACCESS_KEY_ID",
            "R2_SECRET_ACCESS_KEY",
            "R2_BUCKET_NAME",
            "SUPABASE_URL",
            "SUPABASE_SERVICE_KEY",
            "CLOUDTASKS_PROJECT",
            "CLOUDTASKS_LOCATION",
            "WORKER_BASE_URL",
        ] {
            if std::env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
                missing.push(var);
            }
        }
        missing
    }
}
