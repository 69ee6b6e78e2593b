//! Shared worker state.

use std::sync::Arc;

use vscribe_ocr::{GeminiOcrProvider, OcrEngine, RateLimiter, RateLimiterConfig};
use vscribe_queue::TaskQueueClient;
use vscribe_status::{CheckpointRepo, StatusRepo, StatusStoreClient};
use vscribe_storage::{FsResultSink, R2Client, R2ResultSink, ResultSink};

use crate::config::{ResultSinkKind, WorkerConfig};
use crate::error::WorkerResult;
use crate::quota::QuotaClient;
use crate::shutdown::ActiveJobs;
use crate::whisper::WhisperClient;

/// Everything the handlers and pipeline share. Cloning is cheap; all
/// fields are handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WorkerConfig>,
    pub storage: R2Client,
    pub status: StatusRepo,
    pub checkpoints: CheckpointRepo,
    pub queue: TaskQueueClient,
    pub ocr: Arc<OcrEngine>,
    pub speech_limiter: Arc<RateLimiter>,
    pub whisper: WhisperClient,
    pub result_sink: Arc<dyn ResultSink>,
    pub quota: Option<QuotaClient>,
    pub active_jobs: ActiveJobs,
}

impl AppState {
    /// Build the full production wiring from configuration.
    ///
    /// The rate limiters and the provider pool live here: state is the
    /// process-wide container, so tests can build their own without
    /// global singletons.
    pub fn build(config: WorkerConfig, queue: TaskQueueClient) -> WorkerResult<Self> {
        let storage = R2Client::from_env()?;
        let store = StatusStoreClient::from_env()?;
        let status = StatusRepo::new(store.clone());
        let checkpoints = CheckpointRepo::new(store);

        let vision_limiter = Arc::new(RateLimiter::new("vision", RateLimiterConfig::vision()));
        let speech_limiter = Arc::new(RateLimiter::new("speech", RateLimiterConfig::speech()));
        let ocr = Arc::new(OcrEngine::new(GeminiOcrProvider::default_pool(
            &config.gemini_api_key,
            vision_limiter,
        )));

        let whisper = WhisperClient::new(&config.openai_api_key, &config.speech_api_url);

        let result_sink: Arc<dyn ResultSink> = match config.result_sink {
            ResultSinkKind::Fs => Arc::new(FsResultSink::new(&config.result_dir)),
            ResultSinkKind::R2 => Arc::new(R2ResultSink::new(storage.clone())),
        };

        let quota = config
            .quota_service_url
            .as_ref()
            .map(|url| QuotaClient::new(url));

        Ok(Self {
            config: Arc::new(config),
            storage,
            status,
            checkpoints,
            queue,
            ocr,
            speech_limiter,
            whisper,
            result_sink,
            quota,
            active_jobs: ActiveJobs::new(),
        })
    }
}
