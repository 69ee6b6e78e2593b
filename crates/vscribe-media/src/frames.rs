//! Mid-point frame extraction.

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Output frame width.
pub const FRAME_WIDTH: u32 = 1280;

/// Output frame height.
pub const FRAME_HEIGHT: u32 = 720;

/// Timeout for a single frame extraction.
pub const FRAME_TIMEOUT_SECS: u64 = 30;

/// Extract one frame at `at` seconds, resized to 1280x720 PNG.
pub async fn extract_frame(
    video: impl AsRef<Path>,
    workdir: impl AsRef<Path>,
    name: &str,
    at: f64,
) -> MediaResult<PathBuf> {
    let out = workdir.as_ref().join(format!("{}.png", name));

    let cmd = FfmpegCommand::new(video.as_ref(), &out)
        .seek(at)
        .single_frame()
        .video_filter(format!("scale={}:{}", FRAME_WIDTH, FRAME_HEIGHT))
        .no_audio();

    FfmpegRunner::new()
        .with_timeout(FRAME_TIMEOUT_SECS)
        .run(&cmd)
        .await?;

    if !out.exists() {
        return Err(MediaError::FileNotFound(out));
    }
    Ok(out)
}

/// Deterministic frame file name for a scene's mid-point screenshot.
pub fn scene_frame_name(scene_number: u32) -> String {
    format!("scene_{:04}", scene_number)
}

/// Frame file name for a multi-frame OCR position within a scene.
pub fn multi_frame_name(scene_number: u32, position_index: usize) -> String {
    format!("scene_{:04}_p{}", scene_number, position_index)
}
