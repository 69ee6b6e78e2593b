//! Voice activity detection and chunk packing.
//!
//! PCM samples are fed frame-by-frame to Silero VAD v5. Frames above
//! the speech threshold open a voice segment; segments shorter than
//! `MIN_SPEECH_DURATION` are discarded; surviving segments are packed
//! greedily into chunks of at most `MAX_CHUNK_DURATION` seconds, each
//! chunk keeping its member segments for later timestamp recovery.

use tracing::{debug, info};
use voice_activity_detector::VoiceActivityDetector;

use vscribe_models::{SpeechChunk, VoiceSegment};

use crate::audio::SAMPLE_RATE;
use crate::error::{MediaError, MediaResult};

/// Samples per VAD frame at 16 kHz (fixed by Silero VAD v5).
pub const FRAME_SIZE: usize = 512;

/// Speech probability threshold.
pub const SPEECH_THRESHOLD: f32 = 0.5;

/// Segments shorter than this are discarded (seconds).
pub const MIN_SPEECH_DURATION: f64 = 0.25;

/// Maximum packed chunk duration (seconds).
pub const MAX_CHUNK_DURATION: f64 = 10.0;

/// Observability numbers recorded alongside VAD output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadStats {
    /// Fraction of the audio that contains speech, 0.0-1.0
    pub voice_ratio: f64,
    /// Transcription cost saved by skipping silence, percent
    pub estimated_savings: f64,
}

/// Wrapper around Silero VAD for 16 kHz mono PCM.
pub struct SileroVad {
    vad: VoiceActivityDetector,
}

impl SileroVad {
    pub fn new() -> MediaResult<Self> {
        let vad = VoiceActivityDetector::builder()
            .sample_rate(SAMPLE_RATE as i64)
            .chunk_size(FRAME_SIZE)
            .build()
            .map_err(|e| MediaError::vad(format!("Failed to create VAD: {:?}", e)))?;
        Ok(Self { vad })
    }

    /// Run VAD over the full sample buffer and return voice segments.
    pub fn detect(&mut self, samples: &[i16]) -> Vec<VoiceSegment> {
        let frame_secs = FRAME_SIZE as f64 / SAMPLE_RATE as f64;
        let probs: Vec<f32> = samples
            .chunks(FRAME_SIZE)
            .map(|frame| self.vad.predict(frame.iter().map(|&s| s as f32 / 32768.0)))
            .collect();
        let total_secs = samples.len() as f64 / SAMPLE_RATE as f64;

        let segments = segments_from_probs(&probs, frame_secs, total_secs);
        debug!(
            frames = probs.len(),
            segments = segments.len(),
            "VAD pass complete"
        );
        segments
    }
}

/// Convert per-frame speech probabilities into voice segments.
///
/// Segments shorter than `MIN_SPEECH_DURATION` are dropped. Confidence
/// is the mean speech probability across the segment's frames.
pub fn segments_from_probs(probs: &[f32], frame_secs: f64, total_secs: f64) -> Vec<VoiceSegment> {
    let mut segments = Vec::new();
    let mut open: Option<(usize, Vec<f32>)> = None;

    for (i, &p) in probs.iter().enumerate() {
        if p >= SPEECH_THRESHOLD {
            match open.as_mut() {
                Some((_, frame_probs)) => frame_probs.push(p),
                None => open = Some((i, vec![p])),
            }
        } else if let Some((start, frame_probs)) = open.take() {
            push_segment(&mut segments, start, i, &frame_probs, frame_secs, total_secs);
        }
    }
    if let Some((start, frame_probs)) = open {
        push_segment(&mut segments, start, probs.len(), &frame_probs, frame_secs, total_secs);
    }

    segments
}

fn push_segment(
    segments: &mut Vec<VoiceSegment>,
    start_frame: usize,
    end_frame: usize,
    frame_probs: &[f32],
    frame_secs: f64,
    total_secs: f64,
) {
    let start_time = start_frame as f64 * frame_secs;
    let end_time = (end_frame as f64 * frame_secs).min(total_secs);
    if end_time - start_time < MIN_SPEECH_DURATION {
        return;
    }
    let confidence = frame_probs.iter().map(|&p| p as f64).sum::<f64>() / frame_probs.len() as f64;
    segments.push(VoiceSegment {
        start_time,
        end_time,
        confidence,
    });
}

/// Pack voice segments greedily into chunks of at most
/// `MAX_CHUNK_DURATION` seconds.
///
/// A segment joins the current chunk while the chunk's span measured
/// from its first segment's start stays within the limit; otherwise a
/// new chunk starts.
pub fn pack_chunks(segments: &[VoiceSegment]) -> Vec<SpeechChunk> {
    let mut chunks: Vec<SpeechChunk> = Vec::new();

    for seg in segments {
        match chunks.last_mut() {
            Some(chunk) if seg.end_time - chunk.start_time <= MAX_CHUNK_DURATION => {
                chunk.end_time = seg.end_time;
                chunk.segments.push(*seg);
            }
            _ => chunks.push(SpeechChunk {
                index: chunks.len() as u32,
                start_time: seg.start_time,
                end_time: seg.end_time,
                segments: vec![*seg],
            }),
        }
    }

    chunks
}

/// Compute voice ratio and estimated transcription savings.
pub fn compute_stats(segments: &[VoiceSegment], total_secs: f64) -> VadStats {
    let voiced: f64 = segments.iter().map(|s| s.duration()).sum();
    let voice_ratio = if total_secs > 0.0 {
        (voiced / total_secs).min(1.0)
    } else {
        0.0
    };
    let stats = VadStats {
        voice_ratio,
        estimated_savings: (1.0 - voice_ratio) * 100.0,
    };
    info!(
        voice_ratio = format!("{:.2}", stats.voice_ratio),
        estimated_savings_pct = format!("{:.1}", stats.estimated_savings),
        "VAD stats"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64) -> VoiceSegment {
        VoiceSegment {
            start_time: start,
            end_time: end,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_segments_from_probs_basic() {
        // 32ms frames: 20 speech frames = 0.64s segment
        let mut probs = vec![0.1f32; 10];
        probs.extend(vec![0.9f32; 20]);
        probs.extend(vec![0.1f32; 10]);

        let frame_secs = 512.0 / 16000.0;
        let segments = segments_from_probs(&probs, frame_secs, 40.0 * frame_secs);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].start_time - 10.0 * frame_secs).abs() < 1e-9);
        assert!((segments[0].end_time - 30.0 * frame_secs).abs() < 1e-9);
        assert!(segments[0].confidence > 0.8);
    }

    #[test]
    fn test_short_segments_discarded() {
        // 5 speech frames = 0.16s, below the 0.25s floor
        let mut probs = vec![0.1f32; 10];
        probs.extend(vec![0.9f32; 5]);
        probs.extend(vec![0.1f32; 10]);

        let frame_secs = 512.0 / 16000.0;
        let segments = segments_from_probs(&probs, frame_secs, 25.0 * frame_secs);
        assert!(segments.is_empty());
    }

    #[test]
    fn test_trailing_speech_is_closed() {
        let probs = vec![0.9f32; 20];
        let frame_secs = 512.0 / 16000.0;
        let segments = segments_from_probs(&probs, frame_secs, 20.0 * frame_secs);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_pack_single_chunk() {
        let segments = vec![seg(0.0, 2.0), seg(3.0, 5.0), seg(6.0, 9.0)];
        let chunks = pack_chunks(&segments);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].segments.len(), 3);
        assert!((chunks[0].start_time - 0.0).abs() < f64::EPSILON);
        assert!((chunks[0].end_time - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pack_splits_on_limit() {
        // Third segment would stretch the first chunk past 10s
        let segments = vec![seg(0.0, 4.0), seg(5.0, 9.0), seg(9.5, 12.0)];
        let chunks = pack_chunks(&segments);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].segments.len(), 2);
        assert_eq!(chunks[1].index, 1);
        assert!((chunks[1].start_time - 9.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pack_long_single_segment_gets_own_chunk() {
        let segments = vec![seg(0.0, 15.0), seg(16.0, 17.0)];
        let chunks = pack_chunks(&segments);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].segments.len(), 1);
    }

    #[test]
    fn test_stats() {
        let segments = vec![seg(0.0, 3.0), seg(5.0, 7.0)];
        let stats = compute_stats(&segments, 10.0);
        assert!((stats.voice_ratio - 0.5).abs() < 1e-9);
        assert!((stats.estimated_savings - 50.0).abs() < 1e-9);

        let empty = compute_stats(&[], 0.0);
        assert_eq!(empty.voice_ratio, 0.0);
    }
}
