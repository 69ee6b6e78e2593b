//! Pipeline orchestrator.
//!
//! One job runs end-to-end inside a single worker request; the HTTP
//! connection stays open so the task queue treats a crashed or
//! timed-out worker as a retryable delivery. Large scene counts hand
//! phase 2 off to the batch chain instead of finishing inline.

use std::path::Path;
use std::time::Instant;

use tempfile::TempDir;
use tracing::info;

use vscribe_media::{frames, probe_video, scenes as scene_detect};
use vscribe_models::{
    result_key, source_key, BatchTask, Checkpoint, CheckpointStep, DetectionMode, JobInfo, Phase,
    ProcessRequest, ProcessingMetadata, Scene, Stage, StatusKind, TranscriptSegment, VideoMetadata,
};
use vscribe_ocr::filter_persistent_overlays;
use vscribe_report::{align_narration, generate_report, ReportInput};
use vscribe_storage::JobStateStore;

use crate::audio_stage;
use crate::batch::{self, BATCH_CHAIN_DELAY};
use crate::cleanup;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{download_progress, ProgressWriter};
use crate::state::AppState;
use crate::visual_stage;

/// Hard limit on one source-video download.
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Rough wall-clock estimate for one 100-scene batch.
const SECS_PER_BATCH_ESTIMATE: u64 = 180;

/// Rough wall-clock estimate for report assembly.
const REPORT_SECS_ESTIMATE: u64 = 60;

/// How a `/process-task` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The job finished and the result was uploaded
    Completed,
    /// Phase 2 was handed off to the batch chain
    BatchesDispatched,
}

/// Run one job. Terminal failures are written to the status row here;
/// queue-retryable failures bubble to the handler as 500.
pub async fn run_job(state: &AppState, request: &ProcessRequest) -> WorkerResult<PipelineOutcome> {
    let logger = JobLogger::new(&request.upload_id, "pipeline");
    let _guard = state.active_jobs.register(&request.upload_id);
    metrics::record_job_started();
    let started = Instant::now();

    let progress = ProgressWriter::new(
        state.status.clone(),
        &request.upload_id,
        state.config.is_production(),
    );
    let _heartbeat = progress.start_heartbeat();

    match run_pipeline(state, request, &progress, &logger).await {
        Ok(outcome) => {
            if outcome == PipelineOutcome::Completed {
                metrics::record_job_completed(started.elapsed().as_secs_f64());
            }
            Ok(outcome)
        }
        Err(e) => {
            metrics::record_job_failed();
            logger.failure(&format!("Job failed: {}", e));
            if !e.is_queue_retryable() {
                let _ = state
                    .status
                    .fail(&request.upload_id, &user_facing_error(&e))
                    .await;
                cleanup::finalize_failure(state, &request.user_id, &request.upload_id).await;
            }
            Err(e)
        }
    }
}

async fn run_pipeline(
    state: &AppState,
    request: &ProcessRequest,
    progress: &ProgressWriter,
    logger: &JobLogger,
) -> WorkerResult<PipelineOutcome> {
    tokio::fs::create_dir_all(&state.config.work_dir).await?;
    let workdir = TempDir::with_prefix_in("vscribe-job-", &state.config.work_dir)?;

    // Download
    progress.set_status(StatusKind::Downloading).await?;
    let mut checkpoint = Checkpoint::new(&request.upload_id, CheckpointStep::Download);
    state.checkpoints.put(&checkpoint).await?;

    let source_path = workdir.path().join("source.mp4");
    download_source(state, progress, &request.r2_key, &source_path).await?;

    // Probe
    progress
        .update(25, Stage::Metadata, Some("Reading video metadata".to_string()))
        .await?;
    let video_meta = probe_video(&source_path)
        .await
        .map_err(|e| WorkerError::processing_failed(format!("probe failed: {}", e)))?;
    info!(
        upload_id = %request.upload_id,
        duration = video_meta.duration,
        has_audio = video_meta.has_audio,
        "Source probed"
    );

    progress.set_status(StatusKind::Processing).await?;

    // Phase 1: audio
    let mut warnings = Vec::new();
    let segments: Vec<TranscriptSegment> = if video_meta.has_audio {
        progress.phase_started(Phase::Audio).await?;
        checkpoint.advance(CheckpointStep::Audio);
        state.checkpoints.put(&checkpoint).await?;

        let output =
            audio_stage::run_audio_phase(state, progress, logger, &source_path, workdir.path())
                .await?;
        warnings.extend(output.warnings);
        progress.phase_completed(Phase::Audio).await?;
        output.segments
    } else {
        logger.progress("No audio stream; skipping transcription phase");
        progress
            .phase_skipped(Phase::Audio, Stage::AudioSkipped)
            .await?;
        Vec::new()
    };

    // Phase 2: visual
    progress.phase_started(Phase::Visual).await?;
    checkpoint.advance(CheckpointStep::SceneDetect);
    state.checkpoints.put(&checkpoint).await?;

    let mut scenes = visual_stage::detect(
        progress,
        logger,
        &source_path,
        video_meta.duration,
        request.detection_mode,
    )
    .await?;

    if batch::needs_batching(scenes.len() as u32, state.config.batch_size) {
        return dispatch_batches(
            state,
            request,
            progress,
            logger,
            &video_meta,
            &scenes,
            &segments,
            &mut checkpoint,
        )
        .await;
    }

    let inline = visual_stage::run_inline_ocr(
        state,
        progress,
        logger,
        &source_path,
        workdir.path(),
        &mut scenes,
        request.detection_mode,
    )
    .await?;
    warnings.extend(inline.warnings);

    let removed_overlays = apply_ocr_texts(&mut scenes, inline.texts);
    progress.phase_completed(Phase::Visual).await?;

    let mut screenshots = Vec::with_capacity(inline.screenshots.len());
    for path in &inline.screenshots {
        screenshots.push(tokio::fs::read(path).await.ok());
    }

    assemble_report(
        state,
        progress,
        logger,
        &JobInfo::from(request),
        &video_meta,
        scenes,
        screenshots,
        &segments,
        warnings,
        removed_overlays,
        workdir.path(),
    )
    .await?;

    Ok(PipelineOutcome::Completed)
}

async fn download_source(
    state: &AppState,
    progress: &ProgressWriter,
    r2_key: &str,
    dest: &Path,
) -> WorkerResult<()> {
    let (tx, mut rx) = tokio::sync::watch::channel(10u8);
    let watcher = {
        let progress = progress.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = *rx.borrow();
                let _ = progress
                    .set_overall_progress(value, Stage::Downloading, None)
                    .await;
            }
        })
    };

    let download = state.storage.download_file_with_progress(r2_key, dest, move |done, total| {
        let _ = tx.send(download_progress(done, total));
    });
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
        download,
    )
    .await;
    watcher.abort();

    match result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.is_not_found() => Err(WorkerError::processing_failed(format!(
            "source object missing: {}",
            e
        ))),
        Ok(Err(e)) => Err(WorkerError::download_failed(e.to_string())),
        Err(_) => Err(WorkerError::download_failed(format!(
            "download timed out after {} seconds",
            DOWNLOAD_TIMEOUT_SECS
        ))),
    }
}

/// Switch phase 2 to batch-chained execution: persist the shared state
/// blobs, checkpoint the scene count, and enqueue batch 0.
#[allow(clippy::too_many_arguments)]
async fn dispatch_batches(
    state: &AppState,
    request: &ProcessRequest,
    progress: &ProgressWriter,
    logger: &JobLogger,
    video_meta: &VideoMetadata,
    scenes: &[Scene],
    segments: &[TranscriptSegment],
    checkpoint: &mut Checkpoint,
) -> WorkerResult<PipelineOutcome> {
    let blobs = JobStateStore::new(state.storage.clone(), &request.user_id, &request.upload_id);
    blobs.put_job_info(&JobInfo::from(request)).await?;
    blobs.put_scenes(scenes).await?;
    blobs.put_transcript(segments).await?;
    blobs.put_video_metadata(video_meta).await?;

    checkpoint.total_scenes = scenes.len() as u32;
    checkpoint.advance(CheckpointStep::Ocr);
    state.checkpoints.put(checkpoint).await?;

    let batches = batch::plan_batches(
        &request.upload_id,
        &request.user_id,
        &source_key(&request.user_id, &request.upload_id),
        video_meta.duration,
        scenes.len() as u32,
        state.config.batch_size,
    );
    logger.progress(&format!(
        "Dispatching {} scenes across {} OCR batches",
        scenes.len(),
        batches.len()
    ));

    progress
        .set_overall_progress(
            batch::BATCH_PROGRESS_FLOOR,
            Stage::BatchProcessing,
            Some(format!("Queued {} OCR batches", batches.len())),
        )
        .await?;

    state.queue.enqueue_ocr_batch(&batches[0], None).await?;
    Ok(PipelineOutcome::BatchesDispatched)
}

/// Run one OCR batch continuation.
pub async fn run_ocr_batch(state: &AppState, task: &BatchTask) -> WorkerResult<()> {
    let logger = JobLogger::new(&task.upload_id, "ocr_batch");
    let _guard = state.active_jobs.register(&task.upload_id);

    let progress = ProgressWriter::new(
        state.status.clone(),
        &task.upload_id,
        state.config.is_production(),
    );
    // Never move the row backwards from what earlier requests wrote
    let formula_floor = if task.batch_index == 0 {
        batch::BATCH_PROGRESS_FLOOR
    } else {
        batch::batch_progress(task.batch_index - 1, task.total_batches)
    };
    progress.init_floor(formula_floor).await;
    if let Ok(Some(row)) = state.status.get(&task.upload_id).await {
        progress.init_floor(row.progress).await;
    }
    let _heartbeat = progress.start_heartbeat();

    let blobs = JobStateStore::new(state.storage.clone(), &task.user_id, &task.upload_id);
    let info = blobs.get_job_info().await?;
    let scenes = blobs.get_scenes().await?;
    let video_meta = blobs.get_video_metadata().await?;

    let mut checkpoint = match state.checkpoints.get(&task.upload_id).await? {
        Some(cp) => cp,
        None => {
            let mut cp = Checkpoint::new(&task.upload_id, CheckpointStep::Ocr);
            cp.total_scenes = scenes.len() as u32;
            cp
        }
    };

    let pending = checkpoint.pending_in_range(task.scene_range());
    logger.start(&format!(
        "Batch {}/{}: {} scenes pending of {}",
        task.batch_index + 1,
        task.total_batches,
        pending.len(),
        task.scene_range().len()
    ));

    if !pending.is_empty() {
        process_batch_scenes(state, &progress, &logger, task, &info, &scenes, &blobs, &pending)
            .await?;
        checkpoint.record_ocr_scenes(task.scene_range());
        state.checkpoints.put(&checkpoint).await?;
    }

    progress
        .set_overall_progress(
            batch::batch_progress(task.batch_index, task.total_batches),
            Stage::BatchProcessing,
            Some(format!(
                "OCR batch {}/{} complete",
                task.batch_index + 1,
                task.total_batches
            )),
        )
        .await?;
    metrics::record_batch_completed();

    let remaining_batches = task.total_batches.saturating_sub(task.batch_index + 1) as u64;
    let eta_secs = remaining_batches * SECS_PER_BATCH_ESTIMATE + REPORT_SECS_ESTIMATE;
    progress.set_eta(crate::progress::format_eta(eta_secs)).await?;

    match batch::next_batch(task, scenes.len() as u32) {
        Some(next) => {
            state
                .queue
                .enqueue_ocr_batch(&next, Some(BATCH_CHAIN_DELAY))
                .await?;
            Ok(())
        }
        None => finalize_batched_job(state, &progress, &logger, task, &info, &video_meta, scenes, &blobs).await,
    }
}

/// OCR the pending scenes of one batch and persist the results.
#[allow(clippy::too_many_arguments)]
async fn process_batch_scenes(
    state: &AppState,
    progress: &ProgressWriter,
    logger: &JobLogger,
    task: &BatchTask,
    info: &JobInfo,
    scenes: &[Scene],
    blobs: &JobStateStore,
    pending: &[u32],
) -> WorkerResult<()> {
    tokio::fs::create_dir_all(&state.config.work_dir).await?;
    let workdir = TempDir::with_prefix_in("vscribe-batch-", &state.config.work_dir)?;

    // Progress floor while this batch runs: the previous batch's value
    let current_floor = if task.batch_index == 0 {
        batch::BATCH_PROGRESS_FLOOR
    } else {
        batch::batch_progress(task.batch_index - 1, task.total_batches)
    };

    progress
        .set_overall_progress(
            current_floor,
            Stage::BatchProcessing,
            Some(format!(
                "Downloading video for batch {}/{}",
                task.batch_index + 1,
                task.total_batches
            )),
        )
        .await?;

    let source_path = workdir.path().join("source.mp4");
    tokio::time::timeout(
        std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
        state
            .storage
            .download_file_with_progress(&task.video_key, &source_path, |_, _| {}),
    )
    .await
    .map_err(|_| {
        WorkerError::download_failed(format!(
            "download timed out after {} seconds",
            DOWNLOAD_TIMEOUT_SECS
        ))
    })?
    .map_err(|e| WorkerError::download_failed(e.to_string()))?;

    let mut results: Vec<(u32, String)> = blobs
        .get_ocr_batch(task.batch_index)
        .await?
        .unwrap_or_default();

    for (done, &scene_index) in pending.iter().enumerate() {
        let Some(scene) = scenes.get(scene_index as usize) else {
            logger.warning(&format!("Scene index {} out of range, skipping", scene_index));
            continue;
        };

        let frames =
            visual_stage::extract_scene_frames(&source_path, workdir.path(), scene, info.detection_mode)
                .await?;
        let text = visual_stage::ocr_scene_frames(state, &frames, info.detection_mode).await?;
        blobs.put_frame(scene.scene_number, &frames.screenshot).await?;
        results.push((scene_index, text));

        if (done + 1) % 10 == 0 {
            progress
                .set_overall_progress(
                    current_floor,
                    Stage::BatchProcessing,
                    Some(format!(
                        "Batch {}/{}: scene {}/{}",
                        task.batch_index + 1,
                        task.total_batches,
                        done + 1,
                        pending.len()
                    )),
                )
                .await?;
        }
    }

    results.sort_by_key(|(index, _)| *index);
    results.dedup_by_key(|(index, _)| *index);
    blobs.put_ocr_batch(task.batch_index, &results).await?;
    Ok(())
}

/// Last batch: assemble the report from the persisted blobs.
#[allow(clippy::too_many_arguments)]
async fn finalize_batched_job(
    state: &AppState,
    progress: &ProgressWriter,
    logger: &JobLogger,
    task: &BatchTask,
    info: &JobInfo,
    video_meta: &VideoMetadata,
    mut scenes: Vec<Scene>,
    blobs: &JobStateStore,
) -> WorkerResult<()> {
    progress.phase_completed(Phase::Visual).await?;

    let segments = blobs.get_transcript().await?;
    let all_ocr = blobs.get_all_ocr().await?;

    let mut texts = vec![String::new(); scenes.len()];
    for (index, text) in all_ocr {
        if let Some(slot) = texts.get_mut(index as usize) {
            *slot = text;
        }
    }
    let removed_overlays = apply_ocr_texts(&mut scenes, texts);

    let mut screenshots = Vec::with_capacity(scenes.len());
    for scene in &scenes {
        screenshots.push(blobs.get_frame(scene.scene_number).await.ok());
    }

    tokio::fs::create_dir_all(&state.config.work_dir).await?;
    let workdir = TempDir::with_prefix_in("vscribe-report-", &state.config.work_dir)?;

    let result = assemble_report(
        state,
        progress,
        logger,
        info,
        video_meta,
        scenes,
        screenshots,
        &segments,
        Vec::new(),
        removed_overlays,
        workdir.path(),
    )
    .await;

    if let Err(e) = &result {
        if !e.is_queue_retryable() {
            let _ = state
                .status
                .fail(&task.upload_id, &user_facing_error(e))
                .await;
            cleanup::finalize_failure(state, &task.user_id, &task.upload_id).await;
        }
    }
    result
}

/// Apply the persistent-overlay filter and attach texts to scenes.
/// Returns the removed overlay lines.
fn apply_ocr_texts(scenes: &mut [Scene], texts: Vec<String>) -> Vec<String> {
    let filtered = filter_persistent_overlays(&texts);
    for (scene, text) in scenes.iter_mut().zip(filtered.texts) {
        scene.ocr_text = text.trim().to_string();
    }
    filtered.removed_lines
}

/// Phase 3: align narration, generate the workbook, upload it, and
/// write the terminal status. Shared by the inline and batched paths.
#[allow(clippy::too_many_arguments)]
async fn assemble_report(
    state: &AppState,
    progress: &ProgressWriter,
    logger: &JobLogger,
    info: &JobInfo,
    video_meta: &VideoMetadata,
    mut scenes: Vec<Scene>,
    screenshots: Vec<Option<Vec<u8>>>,
    segments: &[TranscriptSegment],
    warnings: Vec<String>,
    removed_overlays: Vec<String>,
    workdir: &Path,
) -> WorkerResult<()> {
    let logger = logger.step("report");
    progress.phase_started(Phase::Report).await?;

    progress
        .update(10, Stage::NarrationMapping, Some("Aligning narration".to_string()))
        .await?;
    align_narration(&mut scenes, segments);

    progress
        .update(40, Stage::ExcelGeneration, Some("Generating workbook".to_string()))
        .await?;
    let report_path = workdir.join("report.xlsx");
    let transcription_length_chars: u32 = segments.iter().map(|s| s.text.chars().count() as u32).sum();

    let input = ReportInput {
        scenes,
        screenshots,
        video: video_meta.clone(),
        detection_mode: info.detection_mode,
        detection_params: detection_params(info.detection_mode, state.config.batch_size),
        removed_overlays,
        warnings,
        segment_count: segments.len() as u32,
        transcription_length_chars,
    };

    let summary = {
        let path = report_path.clone();
        tokio::task::spawn_blocking(move || generate_report(&input, &path))
            .await
            .map_err(|e| WorkerError::processing_failed(format!("report task panicked: {}", e)))??
    };

    progress
        .update(80, Stage::UploadResult, Some("Uploading report".to_string()))
        .await?;
    let key = result_key(&info.user_id, &info.upload_id, &info.file_name, chrono::Utc::now());
    state.result_sink.store(&key, &report_path).await?;

    let metadata = ProcessingMetadata {
        duration_sec: video_meta.duration,
        segment_count: segments.len() as u32,
        ocr_result_count: summary.ocr_result_count,
        transcription_length_chars,
        total_scenes: summary.total_scenes,
        scenes_with_ocr: summary.scenes_with_ocr,
        scenes_with_narration: summary.scenes_with_narration,
        detection_mode: info.detection_mode.to_string(),
        result_r2_key: Some(key.clone()),
    };
    state.status.complete(&info.upload_id, &key, &metadata).await?;

    cleanup::finalize_success(state, &info.user_id, &info.upload_id).await;
    logger.progress(&format!("Report uploaded to {}", key));
    Ok(())
}

/// The detection parameters block shown on the Statistics sheet.
fn detection_params(mode: DetectionMode, batch_size: u32) -> Vec<(String, String)> {
    let mut params = vec![
        (
            "Scene thresholds".to_string(),
            scene_detect::SCENE_THRESHOLDS
                .iter()
                .map(|t| format!("{:.2}", t))
                .collect::<Vec<_>>()
                .join(" / "),
        ),
        (
            "Min scene interval (s)".to_string(),
            format!("{:.1}", scene_detect::MIN_SCENE_INTERVAL),
        ),
        (
            "Min scene duration (s)".to_string(),
            format!("{:.1}", scene_detect::MIN_SCENE_DURATION),
        ),
        (
            "Frame size".to_string(),
            format!("{}x{}", frames::FRAME_WIDTH, frames::FRAME_HEIGHT),
        ),
        ("OCR batch size".to_string(), batch_size.to_string()),
        (
            "VAD chunk limit (s)".to_string(),
            format!("{:.1}", vscribe_media::vad::MAX_CHUNK_DURATION),
        ),
    ];
    if mode == DetectionMode::Enhanced {
        params.push((
            "Multi-frame positions".to_string(),
            "25% / 50% / 75%".to_string(),
        ));
    }
    params
}

/// Closed set of lay-person error messages written to the status row.
pub fn user_facing_error(e: &WorkerError) -> String {
    match e {
        WorkerError::DownloadFailed(_) => {
            "The video could not be downloaded. Please try uploading again.".to_string()
        }
        WorkerError::Media(_) | WorkerError::ProcessingFailed(_) => {
            "The video could not be processed. The file may be corrupted or in an unsupported format."
                .to_string()
        }
        WorkerError::Ocr(_) => {
            "Text recognition is temporarily unavailable. Please try again later.".to_string()
        }
        WorkerError::Report(_) => "Report generation failed. Please try again.".to_string(),
        _ => "Processing stopped unexpectedly. Please try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_ocr_texts_filters_overlays() {
        let mut scenes: Vec<Scene> = (0..4)
            .map(|i| Scene::new(i + 1, i as f64 * 5.0, (i + 1) as f64 * 5.0))
            .collect();
        let texts = vec![
            "Channel42\nfirst".to_string(),
            "Channel42\nsecond".to_string(),
            "Channel42".to_string(),
            "fourth".to_string(),
        ];

        let removed = apply_ocr_texts(&mut scenes, texts);

        assert_eq!(removed, vec!["Channel42".to_string()]);
        assert_eq!(scenes[0].ocr_text, "first");
        assert_eq!(scenes[2].ocr_text, "");
        assert_eq!(scenes[3].ocr_text, "fourth");
    }

    #[test]
    fn test_detection_params_modes() {
        let standard = detection_params(DetectionMode::Standard, 100);
        assert!(standard.iter().any(|(n, v)| n == "Scene thresholds" && v == "0.03 / 0.05 / 0.10"));
        assert!(!standard.iter().any(|(n, _)| n == "Multi-frame positions"));

        let enhanced = detection_params(DetectionMode::Enhanced, 100);
        assert!(enhanced.iter().any(|(n, _)| n == "Multi-frame positions"));
    }

    #[test]
    fn test_user_facing_messages_are_closed_set() {
        let shutdown_like = user_facing_error(&WorkerError::config_error("x"));
        assert_eq!(shutdown_like, "Processing stopped unexpectedly. Please try again.");

        let download = user_facing_error(&WorkerError::download_failed("net"));
        assert!(download.contains("could not be downloaded"));
    }
}
