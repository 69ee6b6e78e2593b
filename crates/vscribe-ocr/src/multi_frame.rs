//! Multi-frame OCR frame selection.
//!
//! Enhanced mode runs OCR on three positions within a scene (25%, 50%,
//! 75%) and picks the best result with the `first_stable` strategy:
//! the earliest frame whose text normalizes equal to the next frame's
//! text; otherwise the frame with the most extracted text.

/// Fractions of the scene at which multi-frame OCR samples frames.
pub const MULTI_FRAME_POSITIONS: [f64; 3] = [0.25, 0.50, 0.75];

/// Normalize text for stability comparison: lowercase, whitespace
/// collapsed.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pick the index of the best frame result under `first_stable`.
///
/// Returns `None` only for an empty input slice.
pub fn select_first_stable(texts: &[String]) -> Option<usize> {
    if texts.is_empty() {
        return None;
    }

    for i in 0..texts.len() - 1 {
        if normalize_text(&texts[i]) == normalize_text(&texts[i + 1]) {
            return Some(i);
        }
    }

    // No stable pair: take the frame with the most extracted text
    texts
        .iter()
        .enumerate()
        .max_by_key(|(_, t)| t.chars().count())
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_text("  Hello   World "), "hello world");
        assert_eq!(normalize_text("HELLO\nworld"), "hello world");
    }

    #[test]
    fn test_first_stable_pair_wins() {
        let t = texts(&["Caption A", "caption  a", "Other"]);
        assert_eq!(select_first_stable(&t), Some(0));
    }

    #[test]
    fn test_later_stable_pair() {
        let t = texts(&["animating…", "Final Caption", "final caption"]);
        assert_eq!(select_first_stable(&t), Some(1));
    }

    #[test]
    fn test_no_stable_pair_falls_back_to_longest() {
        let t = texts(&["short", "a much longer caption", "mid length"]);
        assert_eq!(select_first_stable(&t), Some(1));
    }

    #[test]
    fn test_all_empty_selects_first() {
        let t = texts(&["", "", ""]);
        // Empty texts are trivially stable
        assert_eq!(select_first_stable(&t), Some(0));
    }

    #[test]
    fn test_single_frame() {
        let t = texts(&["only"]);
        assert_eq!(select_first_stable(&t), Some(0));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(select_first_stable(&[]), None);
    }
}
