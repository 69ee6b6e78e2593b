//! Persistent-overlay filtering.
//!
//! Station logos, watermarks, and standing captions show up in the OCR
//! of most scenes. Any line appearing in at least half of all scenes is
//! treated as an overlay and deleted from every scene's text, leaving
//! only scene-specific content. Videos with fewer than three scenes
//! are left untouched.

use std::collections::HashMap;

/// Fraction of scenes a line must appear in to count as an overlay.
const OVERLAY_SCENE_RATIO: f64 = 0.5;

/// Minimum number of scenes for the filter to apply at all.
const MIN_SCENES: usize = 3;

/// Result of the overlay filter.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFilterResult {
    /// Per-scene texts with overlay lines removed
    pub texts: Vec<String>,
    /// The lines that were classified as overlays
    pub removed_lines: Vec<String>,
}

/// Remove persistent overlay lines from per-scene OCR texts.
pub fn filter_persistent_overlays(texts: &[String]) -> OverlayFilterResult {
    if texts.len() < MIN_SCENES {
        return OverlayFilterResult {
            texts: texts.to_vec(),
            removed_lines: Vec::new(),
        };
    }

    // Count each unique line once per scene
    let mut scene_counts: HashMap<&str, usize> = HashMap::new();
    for text in texts {
        let mut seen: Vec<&str> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || seen.contains(&line) {
                continue;
            }
            seen.push(line);
            *scene_counts.entry(line).or_insert(0) += 1;
        }
    }

    let threshold = (texts.len() as f64 * OVERLAY_SCENE_RATIO).ceil() as usize;
    let mut removed_lines: Vec<String> = scene_counts
        .iter()
        .filter(|(_, &count)| count >= threshold)
        .map(|(&line, _)| line.to_string())
        .collect();
    removed_lines.sort();

    if removed_lines.is_empty() {
        return OverlayFilterResult {
            texts: texts.to_vec(),
            removed_lines,
        };
    }

    let filtered = texts
        .iter()
        .map(|text| {
            text.lines()
                .filter(|line| !removed_lines.iter().any(|r| r == line.trim()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();

    OverlayFilterResult {
        texts: filtered,
        removed_lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_overlay_removed_from_every_scene() {
        let input = texts(&[
            "Channel42\nunique one",
            "Channel42\nunique two",
            "Channel42\nunique three",
            "Channel42\nunique four",
            "Channel42\nunique five",
            "Channel42\nunique six",
        ]);
        let result = filter_persistent_overlays(&input);

        assert_eq!(result.removed_lines, vec!["Channel42".to_string()]);
        for (i, text) in result.texts.iter().enumerate() {
            assert!(!text.contains("Channel42"), "scene {} still has overlay", i);
        }
        assert_eq!(result.texts[0], "unique one");
        assert_eq!(result.texts[5], "unique six");
    }

    #[test]
    fn test_below_half_is_kept() {
        let input = texts(&["Logo\na", "Logo\nb", "c", "d", "e", "f"]);
        // Logo appears in 2 of 6 scenes: below the 50% threshold
        let result = filter_persistent_overlays(&input);
        assert!(result.removed_lines.is_empty());
        assert_eq!(result.texts, input);
    }

    #[test]
    fn test_exactly_half_is_removed() {
        let input = texts(&["Logo\na", "Logo\nb", "Logo\nc", "d", "e", "f"]);
        let result = filter_persistent_overlays(&input);
        assert_eq!(result.removed_lines, vec!["Logo".to_string()]);
    }

    #[test]
    fn test_fewer_than_three_scenes_is_noop() {
        let input = texts(&["Logo", "Logo"]);
        let result = filter_persistent_overlays(&input);
        assert!(result.removed_lines.is_empty());
        assert_eq!(result.texts, input);
    }

    #[test]
    fn test_duplicate_line_within_scene_counts_once() {
        let input = texts(&["Logo\nLogo\na", "b", "c", "d"]);
        // One scene out of four: not an overlay
        let result = filter_persistent_overlays(&input);
        assert!(result.removed_lines.is_empty());
    }

    #[test]
    fn test_single_scene_untouched() {
        let input = texts(&["Logo\ncontent"]);
        let result = filter_persistent_overlays(&input);
        assert_eq!(result.texts, input);
    }
}
