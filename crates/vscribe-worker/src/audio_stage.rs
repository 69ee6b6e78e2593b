//! Phase 1: audio extraction, VAD, and transcription fan-out.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::future::join_all;

use vscribe_media::audio;
use vscribe_media::vad::{self, SileroVad};
use vscribe_models::{sort_and_dedup, Stage, TranscriptSegment};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressWriter;
use crate::state::AppState;
use crate::whisper::shift_to_absolute;

/// Phase 1 output.
pub struct AudioPhaseOutput {
    pub segments: Vec<TranscriptSegment>,
    pub warnings: Vec<String>,
}

/// Run the audio phase against an already-downloaded source video.
///
/// The caller has verified an audio stream exists; a missing stream
/// skips this phase entirely.
pub async fn run_audio_phase(
    state: &AppState,
    progress: &ProgressWriter,
    logger: &JobLogger,
    video_path: &Path,
    workdir: &Path,
) -> WorkerResult<AudioPhaseOutput> {
    let logger = logger.step("audio");
    let mut warnings = Vec::new();

    logger.start("Extracting audio track");
    progress
        .update(5, Stage::Audio, Some("Extracting audio".to_string()))
        .await?;
    let audio_path = audio::extract_audio(video_path, workdir).await?;

    progress
        .update(15, Stage::Audio, Some("Suppressing background music".to_string()))
        .await?;
    let processed = audio::preprocess_audio(&audio_path, workdir).await;
    if processed == audio_path {
        warnings.push("Audio preprocessing failed; transcription used unprocessed audio".to_string());
    }

    progress
        .update(25, Stage::VadWhisper, Some("Detecting speech regions".to_string()))
        .await?;
    let samples = audio::convert_to_pcm(&processed, workdir).await?;
    let total_secs = samples.len() as f64 / audio::SAMPLE_RATE as f64;

    let segments = tokio::task::spawn_blocking(move || -> WorkerResult<_> {
        let mut detector = SileroVad::new()?;
        Ok(detector.detect(&samples))
    })
    .await
    .map_err(|e| WorkerError::processing_failed(format!("VAD task panicked: {}", e)))??;

    let stats = vad::compute_stats(&segments, total_secs);
    let chunks = vad::pack_chunks(&segments);
    logger.progress(&format!(
        "VAD found {} voice segments in {} chunks (voice ratio {:.2})",
        segments.len(),
        chunks.len(),
        stats.voice_ratio
    ));

    if chunks.is_empty() {
        return Ok(AudioPhaseOutput {
            segments: Vec::new(),
            warnings,
        });
    }

    progress
        .update(
            40,
            Stage::VadWhisper,
            Some(format!("Transcribing {} chunks", chunks.len())),
        )
        .await?;

    let total_chunks = chunks.len() as u32;
    let done = AtomicU32::new(0);
    let processed = processed.as_path();

    let chunk_futures = chunks.iter().map(|chunk| {
        let logger = logger.clone();
        let done = &done;
        async move {
            let result = transcribe_one_chunk(state, workdir, processed, chunk).await;
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            let local = 40 + (finished * 60 / total_chunks) as u8;
            let _ = progress
                .update(
                    local.min(100),
                    Stage::VadWhisper,
                    Some(format!("Transcribing chunk {}/{}", finished, total_chunks)),
                )
                .await;
            match result {
                Ok(segments) => segments,
                Err(e) => {
                    // One chunk's failure never fails the job
                    logger.warning(&format!(
                        "Chunk {} transcription failed, recording empty result: {}",
                        chunk.index, e
                    ));
                    Vec::new()
                }
            }
        }
    });

    let all: Vec<TranscriptSegment> = join_all(chunk_futures).await.into_iter().flatten().collect();
    let deduped = sort_and_dedup(all);

    logger.progress(&format!("Transcription produced {} segments", deduped.len()));
    Ok(AudioPhaseOutput {
        segments: deduped,
        warnings,
    })
}

async fn transcribe_one_chunk(
    state: &AppState,
    workdir: &Path,
    audio_path: &Path,
    chunk: &vscribe_models::SpeechChunk,
) -> WorkerResult<Vec<TranscriptSegment>> {
    let chunk_file = audio::extract_chunk(
        audio_path,
        workdir,
        chunk.index,
        chunk.start_time,
        chunk.duration().max(0.1),
    )
    .await
    .map_err(|e| match e {
        vscribe_media::MediaError::Timeout(secs) => {
            WorkerError::Media(vscribe_media::MediaError::Timeout(secs))
        }
        other => WorkerError::InvalidChunkAudio {
            chunk_index: chunk.index,
            message: other.to_string(),
        },
    })?;

    metrics::record_transcription_call();
    let segments = state
        .speech_limiter
        .execute_with_retry(
            || state.whisper.transcribe_chunk(&chunk_file),
            WorkerError::is_speech_retryable,
            WorkerError::retry_after,
        )
        .await?;

    let _ = tokio::fs::remove_file(&chunk_file).await;
    Ok(shift_to_absolute(segments, chunk.start_time, chunk.index))
}
