//! Transcript and voice-activity types.

use serde::{Deserialize, Serialize};

/// One transcribed segment with an absolute timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Absolute position in seconds from video start
    pub timestamp: f64,
    pub duration: f64,
    pub text: String,
    /// Model confidence, 0.0-1.0
    pub confidence: f64,
    /// Index of the VAD chunk this segment came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

impl TranscriptSegment {
    /// Whether the segment starts inside `[start, end)`.
    ///
    /// Segments overlapping a scene boundary belong to the scene
    /// containing their start.
    pub fn starts_within(&self, start: f64, end: f64) -> bool {
        self.timestamp >= start && self.timestamp < end
    }
}

/// A speech region reported by VAD.
///
/// Segments are non-overlapping and monotonically ordered, with
/// `end_time > start_time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
}

impl VoiceSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A fixed-duration chunk of packed voice segments sent to the speech
/// API as one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechChunk {
    pub index: u32,
    /// Chunk start: the first packed segment's start
    pub start_time: f64,
    /// Chunk end: the last packed segment's end
    pub end_time: f64,
    /// The original voice segments, kept for timestamp recovery
    pub segments: Vec<VoiceSegment>,
}

impl SpeechChunk {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Sort segments by absolute timestamp and drop exact
/// (timestamp, text) duplicates left behind by overlapping VAD windows.
pub fn sort_and_dedup(mut segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    segments.sort_by(|a, b| {
        a.timestamp
            .partial_cmp(&b.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    segments.dedup_by(|a, b| (a.timestamp - b.timestamp).abs() < 1e-6 && a.text == b.text);
    segments
}
