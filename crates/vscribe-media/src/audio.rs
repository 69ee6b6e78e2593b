//! Audio extraction, preprocessing, and PCM conversion.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Target sample rate for all extracted audio.
pub const SAMPLE_RATE: u32 = 16_000;

/// Timeout for the full-length audio extraction pass.
pub const EXTRACT_TIMEOUT_SECS: u64 = 300;

/// Timeout for the BGM-suppression preprocessing pass.
pub const PREPROCESS_TIMEOUT_SECS: u64 = 300;

/// Timeout for MP3 → raw PCM conversion.
pub const PCM_TIMEOUT_SECS: u64 = 120;

/// Timeout for extracting a single speech chunk.
pub const CHUNK_TIMEOUT_SECS: u64 = 30;

/// Extract the audio track as mono 16 kHz MP3 with loudness
/// normalization.
///
/// Fails the job on subprocess error; callers must check for an audio
/// stream first (a missing stream skips the phase instead).
pub async fn extract_audio(video: impl AsRef<Path>, workdir: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let out = workdir.as_ref().join("audio.mp3");

    let cmd = FfmpegCommand::new(video.as_ref(), &out)
        .no_video()
        .output_args(["-map", "0:a:0"])
        .output_arg("-ar")
        .output_arg(SAMPLE_RATE.to_string())
        .output_args(["-ac", "1"])
        .output_args(["-c:a", "libmp3lame", "-b:a", "64k"])
        .audio_filter("loudnorm=I=-16:TP=-1.5:LRA=11");

    FfmpegRunner::new()
        .with_timeout(EXTRACT_TIMEOUT_SECS)
        .run(&cmd)
        .await?;

    info!("Extracted audio to {}", out.display());
    Ok(out)
}

/// Best-effort background-music suppression.
///
/// Returns the processed file on success, or the original path when the
/// filter pass fails. The fallback is never an error.
pub async fn preprocess_audio(audio: impl AsRef<Path>, workdir: impl AsRef<Path>) -> PathBuf {
    let audio = audio.as_ref();
    let out = workdir.as_ref().join("audio_clean.mp3");

    let cmd = FfmpegCommand::new(audio, &out)
        .audio_filter("highpass=f=80,lowpass=f=8000,afftdn=nf=-25")
        .output_arg("-ar")
        .output_arg(SAMPLE_RATE.to_string())
        .output_args(["-ac", "1"])
        .output_args(["-c:a", "libmp3lame", "-b:a", "64k"]);

    match FfmpegRunner::new()
        .with_timeout(PREPROCESS_TIMEOUT_SECS)
        .run(&cmd)
        .await
    {
        Ok(()) => out,
        Err(e) => {
            warn!("Audio preprocessing failed, using unprocessed audio: {}", e);
            audio.to_path_buf()
        }
    }
}

/// Convert an MP3 to raw signed 16-bit little-endian PCM samples at
/// 16 kHz mono, the input format the VAD model expects.
pub async fn convert_to_pcm(audio: impl AsRef<Path>, workdir: impl AsRef<Path>) -> MediaResult<Vec<i16>> {
    let out = workdir.as_ref().join("audio.pcm");

    let cmd = FfmpegCommand::new(audio.as_ref(), &out)
        .output_args(["-f", "s16le", "-acodec", "pcm_s16le"])
        .output_arg("-ar")
        .output_arg(SAMPLE_RATE.to_string())
        .output_args(["-ac", "1"]);

    FfmpegRunner::new()
        .with_timeout(PCM_TIMEOUT_SECS)
        .run(&cmd)
        .await?;

    let bytes = tokio::fs::read(&out).await?;
    let _ = tokio::fs::remove_file(&out).await;
    Ok(pcm_from_bytes(&bytes))
}

/// Extract a time range of the audio file to a short MP3 for one speech
/// API request.
pub async fn extract_chunk(
    audio: impl AsRef<Path>,
    workdir: impl AsRef<Path>,
    index: u32,
    start: f64,
    duration: f64,
) -> MediaResult<PathBuf> {
    let out = workdir.as_ref().join(format!("chunk_{:04}.mp3", index));

    let cmd = FfmpegCommand::new(audio.as_ref(), &out)
        .seek(start)
        .duration(duration)
        .output_args(["-c:a", "libmp3lame", "-b:a", "64k"])
        .output_arg("-ar")
        .output_arg(SAMPLE_RATE.to_string())
        .output_args(["-ac", "1"]);

    FfmpegRunner::new()
        .with_timeout(CHUNK_TIMEOUT_SECS)
        .run(&cmd)
        .await?;

    if !out.exists() {
        return Err(MediaError::FileNotFound(out));
    }
    Ok(out)
}

/// Decode little-endian s16 bytes into samples, ignoring a trailing
/// odd byte.
pub fn pcm_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_from_bytes() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80, 0x01];
        let samples = pcm_from_bytes(&bytes);
        assert_eq!(samples, vec![0, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_extract_command_shape() {
        let cmd = FfmpegCommand::new("in.mp4", "audio.mp3")
            .no_video()
            .output_args(["-map", "0:a:0"])
            .output_args(["-ar", "16000", "-ac", "1"])
            .output_args(["-c:a", "libmp3lame", "-b:a", "64k"])
            .audio_filter("loudnorm=I=-16:TP=-1.5:LRA=11");
        let args = cmd.build_args();
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"64k".to_string()));
        assert!(args.iter().any(|a| a.starts_with("loudnorm")));
    }
}
