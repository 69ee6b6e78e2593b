//! Scene and video metadata types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::timestamp::format_timecode;

/// A detected scene cut with the strongest confidence observed for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneCut {
    /// Cut position in seconds from video start
    pub time: f64,
    /// Scene-change score at the cut, 0.0-1.0
    pub confidence: f64,
}

/// A contiguous interval between two accepted cuts.
///
/// `scene_number` is 1-based and sequential over accepted scenes: scenes
/// dropped for being too short leave no gaps in the numbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub start_time: f64,
    pub end_time: f64,
    /// `HH:MM:SS` at `start_time`
    pub timecode: String,
    /// Local path of the extracted mid-point frame, transient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    /// On-screen text extracted by OCR, empty until phase 2 fills it
    #[serde(default)]
    pub ocr_text: String,
    /// Narration aligned by timestamp overlap, empty until phase 3
    #[serde(default)]
    pub narration_text: String,
}

impl Scene {
    pub fn new(scene_number: u32, start_time: f64, end_time: f64) -> Self {
        Self {
            scene_number,
            start_time,
            end_time,
            timecode: format_timecode(start_time),
            screenshot_path: None,
            ocr_text: String::new(),
            narration_text: String::new(),
        }
    }

    /// Midpoint of the scene, the single OCR frame position in
    /// standard mode.
    pub fn mid_time(&self) -> f64 {
        (self.start_time + self.end_time) / 2.0
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Frame position at a fraction of the scene (0.0-1.0), used by
    /// multi-frame OCR at 25%, 50% and 75%.
    pub fn time_at_fraction(&self, fraction: f64) -> f64 {
        self.start_time + self.duration() * fraction
    }
}

/// Container-level metadata captured at probe time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub has_audio: bool,
}

impl VideoMetadata {
    /// Width / height; falls back to 16:9 when dimensions are unknown.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            16.0 / 9.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_midpoint() {
        let scene = Scene::new(1, 4.0, 10.0);
        assert!((scene.mid_time() - 7.0).abs() < f64::EPSILON);
        assert!((scene.duration() - 6.0).abs() < f64::EPSILON);
        assert_eq!(scene.timecode, "00:00:04");
    }

    #[test]
    fn test_time_at_fraction() {
        let scene = Scene::new(1, 10.0, 20.0);
        assert!((scene.time_at_fraction(0.25) - 12.5).abs() < f64::EPSILON);
        assert!((scene.time_at_fraction(0.75) - 17.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aspect_ratio() {
        let meta = VideoMetadata {
            width: 1280,
            height: 720,
            duration: 10.0,
            has_audio: true,
        };
        assert!((meta.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);

        let unknown = VideoMetadata {
            width: 0,
            height: 0,
            duration: 0.0,
            has_audio: false,
        };
        assert!((unknown.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);
    }
}
