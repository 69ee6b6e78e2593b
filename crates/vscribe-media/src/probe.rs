//! FFprobe container metadata.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use vscribe_models::VideoMetadata;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a video file for dimensions, duration, and audio presence.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    parse_probe(probe)
}

fn parse_probe(probe: FfprobeOutput) -> MediaResult<VideoMetadata> {
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        duration,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_json(streams: &str) -> FfprobeOutput {
        let json = format!(
            r#"{{"format":{{"duration":"12.5"}},"streams":[{}]}}"#,
            streams
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_parse_probe_with_audio() {
        let probe = probe_json(
            r#"{"codec_type":"video","width":1280,"height":720},{"codec_type":"audio"}"#,
        );
        let meta = parse_probe(probe).unwrap();
        assert_eq!(meta.width, 1280);
        assert_eq!(meta.height, 720);
        assert!(meta.has_audio);
        assert!((meta.duration - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_probe_silent_video() {
        let probe = probe_json(r#"{"codec_type":"video","width":640,"height":480}"#);
        let meta = parse_probe(probe).unwrap();
        assert!(!meta.has_audio);
    }

    #[test]
    fn test_parse_probe_no_video_stream() {
        let probe = probe_json(r#"{"codec_type":"audio"}"#);
        assert!(parse_probe(probe).is_err());
    }
}
