//! Luminance-transition and text-stability detection for enhanced mode.
//!
//! Hard cuts are caught by the scene-score passes; fades, dissolves and
//! animated captions are not. Enhanced mode samples frame statistics at
//! a low rate and derives "stabilization points": timestamps where a
//! sustained change settles. These points seed additional scene
//! boundaries.

use std::path::Path;

use tracing::debug;

use crate::command::FfmpegRunner;
use crate::error::MediaResult;

/// Sampling rate for the statistics passes (frames per second).
const SAMPLE_FPS: u32 = 4;

/// Cumulative average-luminance change that counts as a transition.
const LUMA_TRANSITION_DELTA: f64 = 12.0;

/// Per-frame luminance difference above which the caption band is
/// considered "in motion".
const TEXT_ACTIVITY_THRESHOLD: f64 = 8.0;

/// Per-frame luminance difference below which the caption band has
/// settled.
const TEXT_SETTLE_THRESHOLD: f64 = 2.0;

/// Timeout for one statistics pass.
const STATS_TIMEOUT_SECS: u64 = 300;

/// One sampled frame statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub time: f64,
    pub value: f64,
}

/// Detect fade/dissolve boundaries from average-luminance ramps.
pub async fn detect_luminance_transitions(video: impl AsRef<Path>) -> MediaResult<Vec<f64>> {
    let samples = run_stats_pass(video.as_ref(), "signalstats", "lavfi.signalstats.YAVG").await?;
    let points = luminance_transition_points(&samples);
    debug!(points = points.len(), "Luminance transition detection complete");
    Ok(points)
}

/// Detect caption stabilization points from the bottom band.
pub async fn detect_text_stabilization(video: impl AsRef<Path>) -> MediaResult<Vec<f64>> {
    let samples = run_stats_pass(
        video.as_ref(),
        "crop=iw:ih*0.2:0:ih*0.8,signalstats",
        "lavfi.signalstats.YDIF",
    )
    .await?;
    let points = stabilization_points(&samples);
    debug!(points = points.len(), "Text stabilization detection complete");
    Ok(points)
}

async fn run_stats_pass(video: &Path, filter: &str, key: &str) -> MediaResult<Vec<FrameSample>> {
    let args: Vec<String> = [
        "-hide_banner",
        "-nostats",
        "-v",
        "error",
        "-i",
        &video.to_string_lossy(),
        "-vf",
        &format!("fps={},{},metadata=print:file=-", SAMPLE_FPS, filter),
        "-an",
        "-f",
        "null",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let stdout = FfmpegRunner::new()
        .with_timeout(STATS_TIMEOUT_SECS)
        .run_capturing(&args)
        .await?;

    Ok(parse_stat_samples(&stdout, key))
}

/// Parse `metadata=print` output into (time, value) samples for one
/// statistics key.
pub fn parse_stat_samples(output: &str, key: &str) -> Vec<FrameSample> {
    let prefix = format!("{}=", key);
    let mut samples = Vec::new();
    let mut pending_time: Option<f64> = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.split("pts_time:").nth(1) {
            pending_time = rest.split_whitespace().next().and_then(|t| t.parse().ok());
        } else if let Some(value) = line.strip_prefix(&prefix) {
            if let (Some(time), Ok(value)) = (pending_time, value.parse::<f64>()) {
                samples.push(FrameSample { time, value });
            }
        }
    }

    samples
}

/// Find the end points of sustained monotonic luminance ramps.
pub fn luminance_transition_points(samples: &[FrameSample]) -> Vec<f64> {
    let mut points = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_direction = 0i8;

    for i in 1..samples.len() {
        let delta = samples[i].value - samples[i - 1].value;
        let direction = if delta > 0.5 {
            1
        } else if delta < -0.5 {
            -1
        } else {
            0
        };

        if direction != 0 && direction == run_direction {
            continue;
        }

        if let Some(start) = run_start {
            let total = (samples[i - 1].value - samples[start].value).abs();
            if i - 1 - start >= 2 && total >= LUMA_TRANSITION_DELTA {
                points.push(samples[i - 1].time);
            }
        }

        run_start = if direction != 0 { Some(i - 1) } else { None };
        run_direction = direction;
    }

    if let (Some(start), Some(last)) = (run_start, samples.last()) {
        let total = (last.value - samples[start].value).abs();
        if samples.len() - 1 - start >= 2 && total >= LUMA_TRANSITION_DELTA {
            points.push(last.time);
        }
    }

    points
}

/// Find points where the caption band settles after activity.
pub fn stabilization_points(samples: &[FrameSample]) -> Vec<f64> {
    let mut points = Vec::new();
    let mut active = false;

    for sample in samples {
        if sample.value >= TEXT_ACTIVITY_THRESHOLD {
            active = true;
        } else if active && sample.value <= TEXT_SETTLE_THRESHOLD {
            points.push(sample.time);
            active = false;
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[(f64, f64)]) -> Vec<FrameSample> {
        values
            .iter()
            .map(|&(time, value)| FrameSample { time, value })
            .collect()
    }

    #[test]
    fn test_parse_stat_samples() {
        let output = "\
frame:0 pts:0 pts_time:0.0
lavfi.signalstats.YAVG=40.5
frame:1 pts:1 pts_time:0.25
lavfi.signalstats.YAVG=42.1
";
        let out = parse_stat_samples(output, "lavfi.signalstats.YAVG");
        assert_eq!(out.len(), 2);
        assert!((out[1].time - 0.25).abs() < 1e-9);
        assert!((out[1].value - 42.1).abs() < 1e-9);
    }

    #[test]
    fn test_luminance_ramp_detected() {
        // Steady, then a fade to black over four samples, then steady
        let s = samples(&[
            (0.0, 120.0),
            (0.25, 120.0),
            (0.5, 110.0),
            (0.75, 95.0),
            (1.0, 80.0),
            (1.25, 80.0),
            (1.5, 80.0),
        ]);
        let points = luminance_transition_points(&s);
        assert_eq!(points.len(), 1);
        assert!((points[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_luminance_steady_no_points() {
        let s = samples(&[(0.0, 100.0), (0.25, 100.2), (0.5, 99.9), (0.75, 100.1)]);
        assert!(luminance_transition_points(&s).is_empty());
    }

    #[test]
    fn test_stabilization_after_activity() {
        let s = samples(&[
            (0.0, 1.0),
            (0.25, 12.0), // caption animating in
            (0.5, 9.0),
            (0.75, 1.5), // settled
            (1.0, 1.0),
        ]);
        let points = stabilization_points(&s);
        assert_eq!(points, vec![0.75]);
    }

    #[test]
    fn test_no_stabilization_without_activity() {
        let s = samples(&[(0.0, 1.0), (0.25, 1.2), (0.5, 0.8)]);
        assert!(stabilization_points(&s).is_empty());
    }
}
