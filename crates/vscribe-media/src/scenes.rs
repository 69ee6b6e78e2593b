//! Multi-pass scene detection.
//!
//! Each pass runs FFmpeg's scene-change filter at one threshold and
//! prints per-frame metadata to stdout. Cuts from all passes are merged
//! keeping the maximum confidence per timestamp, cuts closer together
//! than `MIN_SCENE_INTERVAL` collapse to the higher-confidence one, and
//! scenes shorter than `MIN_SCENE_DURATION` are dropped with the
//! numbering kept sequential over accepted scenes.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use vscribe_models::{Scene, SceneCut};

use crate::command::FfmpegRunner;
use crate::error::MediaResult;

/// Detection thresholds for the standard multi-pass sweep.
pub const SCENE_THRESHOLDS: [f64; 3] = [0.03, 0.05, 0.10];

/// Cuts closer together than this collapse to one (seconds).
pub const MIN_SCENE_INTERVAL: f64 = 3.0;

/// Scenes shorter than this are dropped (seconds).
pub const MIN_SCENE_DURATION: f64 = 2.0;

/// Timeout for one detection pass.
pub const DETECT_TIMEOUT_SECS: u64 = 300;

/// Run the full detection sweep and build the scene list.
///
/// `extra_cuts` come from the enhanced-mode detectors (luminance
/// transitions, text stabilization points); they join the merge and
/// collapse passes like any other cut.
pub async fn detect_scenes(
    video: impl AsRef<Path>,
    duration: f64,
    extra_cuts: Vec<SceneCut>,
) -> MediaResult<Vec<Scene>> {
    let video = video.as_ref();
    let mut passes = Vec::with_capacity(SCENE_THRESHOLDS.len() + 1);

    for threshold in SCENE_THRESHOLDS {
        let cuts = run_scene_pass(video, threshold).await?;
        debug!(threshold, cuts = cuts.len(), "Scene pass complete");
        passes.push(cuts);
    }
    if !extra_cuts.is_empty() {
        passes.push(extra_cuts);
    }

    let merged = merge_cuts(passes);
    let collapsed = collapse_close_cuts(merged, MIN_SCENE_INTERVAL);
    let scenes = build_scenes(&collapsed, duration, MIN_SCENE_DURATION);

    info!(scenes = scenes.len(), "Scene detection complete");
    Ok(scenes)
}

/// One detection pass at a single threshold.
pub async fn run_scene_pass(video: &Path, threshold: f64) -> MediaResult<Vec<SceneCut>> {
    let args: Vec<String> = [
        "-hide_banner",
        "-nostats",
        "-v",
        "error",
        "-i",
        &video.to_string_lossy(),
        "-vf",
        &format!("select='gt(scene,{})',metadata=print:file=-", threshold),
        "-an",
        "-f",
        "null",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let stdout = FfmpegRunner::new()
        .with_timeout(DETECT_TIMEOUT_SECS)
        .run_capturing(&args)
        .await?;

    Ok(parse_metadata_cuts(&stdout))
}

/// Parse the `metadata=print` output of a detection pass.
///
/// The filter emits line pairs like:
/// ```text
/// frame:0    pts:150150  pts_time:5.005
/// lavfi.scene_score=0.432
/// ```
pub fn parse_metadata_cuts(output: &str) -> Vec<SceneCut> {
    let mut cuts = Vec::new();
    let mut pending_time: Option<f64> = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.split("pts_time:").nth(1) {
            pending_time = rest.split_whitespace().next().and_then(|t| t.parse().ok());
        } else if let Some(score) = line.strip_prefix("lavfi.scene_score=") {
            if let (Some(time), Ok(confidence)) = (pending_time.take(), score.parse::<f64>()) {
                cuts.push(SceneCut { time, confidence });
            }
        }
    }

    cuts
}

/// Merge cuts from multiple passes, keeping the maximum confidence
/// observed at each timestamp (keyed at millisecond precision so the
/// same frame matches across passes).
pub fn merge_cuts(passes: Vec<Vec<SceneCut>>) -> Vec<SceneCut> {
    let mut by_time: BTreeMap<i64, SceneCut> = BTreeMap::new();

    for cut in passes.into_iter().flatten() {
        let key = (cut.time * 1000.0).round() as i64;
        by_time
            .entry(key)
            .and_modify(|existing| {
                if cut.confidence > existing.confidence {
                    *existing = cut;
                }
            })
            .or_insert(cut);
    }

    by_time.into_values().collect()
}

/// Collapse consecutive cuts closer than `min_interval`, keeping the
/// higher-confidence one of each pair.
pub fn collapse_close_cuts(cuts: Vec<SceneCut>, min_interval: f64) -> Vec<SceneCut> {
    let mut out: Vec<SceneCut> = Vec::with_capacity(cuts.len());

    for cut in cuts {
        match out.last_mut() {
            Some(prev) if cut.time - prev.time < min_interval => {
                if cut.confidence > prev.confidence {
                    *prev = cut;
                }
            }
            _ => out.push(cut),
        }
    }

    out
}

/// Build the scene list from accepted cuts.
///
/// Scenes shorter than `min_duration` are dropped; numbering stays
/// sequential over the accepted scenes.
pub fn build_scenes(cuts: &[SceneCut], duration: f64, min_duration: f64) -> Vec<Scene> {
    let mut boundaries = vec![0.0];
    boundaries.extend(cuts.iter().map(|c| c.time).filter(|&t| t > 0.0 && t < duration));
    boundaries.push(duration);

    let mut scenes = Vec::new();
    let mut number = 1u32;
    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if end - start < min_duration {
            continue;
        }
        scenes.push(Scene::new(number, start, end));
        number += 1;
    }

    scenes
}
