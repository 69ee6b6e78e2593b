//! Lenient parsing of vision-model OCR responses.
//!
//! The model is asked for strict JSON but does not always comply. The
//! parser strips code fences first, then tries JSON, then falls back to
//! mining the response for quoted substrings with a fixed set of
//! natural-language patterns.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Parsed OCR text with a confidence estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOcr {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct OcrJson {
    #[serde(default)]
    text: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// Confidence assigned to pattern-mined (non-JSON) extractions.
const MINED_CONFIDENCE: f64 = 0.3;

/// Natural-language extraction patterns tried in order against
/// responses that fail JSON parsing.
fn extraction_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // "text": "..." fragment inside malformed JSON
            r#""text"\s*:\s*"((?:[^"\\]|\\.)*)""#,
            // The text is "..." / text: "..."
            r#"(?i)text\s*(?:is|:)\s*"((?:[^"\\]|\\.)*)""#,
            // The image reads "..." / it says "..."
            r#"(?i)(?:reads|says)\s*:?\s*"((?:[^"\\]|\\.)*)""#,
            // Any remaining double-quoted run
            r#""((?:[^"\\]|\\.)+)""#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid extraction pattern"))
        .collect()
    })
}

/// Parse a raw model response into text + confidence.
///
/// Never fails: an unusable response yields empty text at zero
/// confidence, which callers record as "no text detected".
pub fn parse_ocr_response(raw: &str) -> ParsedOcr {
    let stripped = strip_code_fences(raw);

    if let Ok(json) = serde_json::from_str::<OcrJson>(stripped.trim()) {
        return ParsedOcr {
            text: json.text.trim().to_string(),
            confidence: json.confidence.clamp(0.0, 1.0),
        };
    }

    for pattern in extraction_patterns() {
        if let Some(captures) = pattern.captures(&stripped) {
            let text = unescape_json_fragment(&captures[1]);
            let text = text.trim();
            if !text.is_empty() {
                return ParsedOcr {
                    text: text.to_string(),
                    confidence: MINED_CONFIDENCE,
                };
            }
        }
    }

    ParsedOcr {
        text: String::new(),
        confidence: 0.0,
    }
}

/// Remove a surrounding markdown code fence, with or without a
/// language tag.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the language tag line (e.g. "json")
    let rest = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => rest,
    };

    rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
}

fn unescape_json_fragment(s: &str) -> String {
    s.replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}
