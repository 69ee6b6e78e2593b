//! Narration-to-scene alignment.

use vscribe_models::{Scene, TranscriptSegment};

/// Fill each scene's `narration_text` from the transcript.
///
/// A segment belongs to the scene whose interval `[start, end)`
/// contains its start timestamp, so segments overlapping a boundary go
/// to the scene they begin in. Texts are joined in timestamp order.
pub fn align_narration(scenes: &mut [Scene], segments: &[TranscriptSegment]) {
    for scene in scenes.iter_mut() {
        let mut matched: Vec<&TranscriptSegment> = segments
            .iter()
            .filter(|t| t.starts_within(scene.start_time, scene.end_time))
            .collect();
        matched.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        scene.narration_text = matched
            .iter()
            .map(|t| t.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }
}
