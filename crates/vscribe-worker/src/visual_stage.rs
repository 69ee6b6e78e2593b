//! Phase 2: scene detection, frame extraction, and inline OCR.

use std::path::{Path, PathBuf};

use futures_util::future::join_all;

use vscribe_media::frames::{self, multi_frame_name, scene_frame_name};
use vscribe_media::scenes::detect_scenes;
use vscribe_media::stability;
use vscribe_models::{DetectionMode, Scene, SceneCut, Stage};
use vscribe_ocr::multi_frame::{select_first_stable, MULTI_FRAME_POSITIONS};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressWriter;
use crate::state::AppState;

/// Confidence assigned to boundaries seeded by the enhanced detectors.
const STABILIZATION_CONFIDENCE: f64 = 0.05;

/// Detect scenes, running the enhanced detectors first when requested.
pub async fn detect(
    progress: &ProgressWriter,
    logger: &JobLogger,
    video_path: &Path,
    duration: f64,
    mode: DetectionMode,
) -> WorkerResult<Vec<Scene>> {
    let logger = logger.step("scene_detection");
    let mut extra_cuts: Vec<SceneCut> = Vec::new();

    if mode == DetectionMode::Enhanced {
        progress
            .update(5, Stage::LuminanceDetection, Some("Detecting fades".to_string()))
            .await?;
        let luminance_points = stability::detect_luminance_transitions(video_path).await?;

        progress
            .update(
                10,
                Stage::TextStabilization,
                Some("Detecting caption changes".to_string()),
            )
            .await?;
        let text_points = stability::detect_text_stabilization(video_path).await?;

        logger.progress(&format!(
            "Enhanced detectors found {} luminance and {} text stabilization points",
            luminance_points.len(),
            text_points.len()
        ));
        extra_cuts.extend(
            luminance_points
                .into_iter()
                .chain(text_points)
                .map(|time| SceneCut {
                    time,
                    confidence: STABILIZATION_CONFIDENCE,
                }),
        );
    }

    progress
        .update(15, Stage::SceneDetection, Some("Detecting scene cuts".to_string()))
        .await?;
    let scenes = detect_scenes(video_path, duration, extra_cuts).await?;

    if scenes.is_empty() {
        // Non-retryable step condition: the report will simply carry
        // zero scene rows
        logger.warning("Scene detection produced no scenes");
    } else {
        logger.progress(&format!("Detected {} scenes", scenes.len()));
    }
    Ok(scenes)
}

/// Extract the frames OCR needs for one scene.
///
/// Standard mode: the single mid-point frame. Enhanced mode: frames at
/// 25%, 50%, and 75%; the 50% frame doubles as the report screenshot.
pub async fn extract_scene_frames(
    video_path: &Path,
    workdir: &Path,
    scene: &Scene,
    mode: DetectionMode,
) -> WorkerResult<SceneFrames> {
    match mode {
        DetectionMode::Standard => {
            let path = frames::extract_frame(
                video_path,
                workdir,
                &scene_frame_name(scene.scene_number),
                scene.mid_time(),
            )
            .await?;
            Ok(SceneFrames {
                screenshot: path.clone(),
                ocr_frames: vec![path],
            })
        }
        DetectionMode::Enhanced => {
            let mut ocr_frames = Vec::with_capacity(MULTI_FRAME_POSITIONS.len());
            let mut screenshot = None;
            for (i, fraction) in MULTI_FRAME_POSITIONS.iter().enumerate() {
                let path = frames::extract_frame(
                    video_path,
                    workdir,
                    &multi_frame_name(scene.scene_number, i),
                    scene.time_at_fraction(*fraction),
                )
                .await?;
                if (*fraction - 0.5).abs() < f64::EPSILON {
                    screenshot = Some(path.clone());
                }
                ocr_frames.push(path);
            }
            let screenshot = screenshot.unwrap_or_else(|| ocr_frames[0].clone());
            Ok(SceneFrames {
                screenshot,
                ocr_frames,
            })
        }
    }
}

/// Frames extracted for one scene.
pub struct SceneFrames {
    /// Mid-point frame embedded in the report
    pub screenshot: PathBuf,
    /// Frames submitted to OCR (one, or three in enhanced mode)
    pub ocr_frames: Vec<PathBuf>,
}

/// OCR one scene's frames and pick the final text.
pub async fn ocr_scene_frames(
    state: &AppState,
    frames: &SceneFrames,
    mode: DetectionMode,
) -> WorkerResult<String> {
    let mut texts = Vec::with_capacity(frames.ocr_frames.len());
    for path in &frames.ocr_frames {
        let bytes = tokio::fs::read(path).await?;
        let outcome = state.ocr.recognize(&bytes).await?;
        metrics::record_ocr_call(&outcome.provider);
        texts.push(outcome.text);
    }

    Ok(match mode {
        DetectionMode::Standard => texts.into_iter().next().unwrap_or_default(),
        DetectionMode::Enhanced => select_first_stable(&texts)
            .map(|i| texts[i].clone())
            .unwrap_or_default(),
    })
}

/// Inline OCR output for the whole scene list.
pub struct InlineOcrOutput {
    /// Text per scene, parallel to the scene list
    pub texts: Vec<String>,
    /// Screenshot path per scene
    pub screenshots: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Run frame extraction and OCR for every scene within this request.
pub async fn run_inline_ocr(
    state: &AppState,
    progress: &ProgressWriter,
    logger: &JobLogger,
    video_path: &Path,
    workdir: &Path,
    scenes: &mut [Scene],
    mode: DetectionMode,
) -> WorkerResult<InlineOcrOutput> {
    let logger = logger.step("ocr");
    let total = scenes.len();
    let mut all_frames = Vec::with_capacity(total);

    for i in 0..total {
        progress
            .update(
                30 + (i * 20 / total.max(1)) as u8,
                Stage::FrameExtraction,
                Some(format!("Extracting frame {}/{}", i + 1, total)),
            )
            .await?;
        let frames = extract_scene_frames(video_path, workdir, &scenes[i], mode).await?;
        scenes[i].screenshot_path = Some(frames.screenshot.clone());
        all_frames.push(frames);
    }

    let ocr_stage = match mode {
        DetectionMode::Standard => Stage::OcrProcessing,
        DetectionMode::Enhanced => Stage::MultiFrameOcr,
    };
    progress
        .update(55, ocr_stage, Some(format!("Running OCR on {} scenes", total)))
        .await?;

    let ocr_futures = all_frames.iter().enumerate().map(|(i, frames)| {
        let logger = logger.clone();
        async move {
            match ocr_scene_frames(state, frames, mode).await {
                Ok(text) => (text, None),
                Err(e) => {
                    logger.warning(&format!("OCR failed for scene {}: {}", i + 1, e));
                    (String::new(), Some(format!("Scene {}: OCR failed", i + 1)))
                }
            }
        }
    });

    let results = join_all(ocr_futures).await;
    let mut texts = Vec::with_capacity(total);
    let mut warnings = Vec::new();
    let mut failed = 0usize;
    for (text, warning) in results {
        if warning.is_some() {
            failed += 1;
        }
        warnings.extend(warning);
        texts.push(text);
    }

    // Every scene failing means the provider pool never recovered
    if total > 0 && failed == total {
        return Err(WorkerError::Ocr(vscribe_ocr::OcrError::AllProvidersUnavailable));
    }

    progress
        .update(95, Stage::OcrCompleted, Some("OCR complete".to_string()))
        .await?;

    Ok(InlineOcrOutput {
        texts,
        screenshots: all_frames.into_iter().map(|f| f.screenshot).collect(),
        warnings,
    })
}
