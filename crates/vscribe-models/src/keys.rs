//! Object-store key layout and filename sanitization.
//!
//! Layout:
//! - source video: `uploads/{user_id}/{upload_id}/source.mp4`
//! - result:       `results/{user_id}/{upload_id}/{title}_{timestamp}.xlsx`

use chrono::{DateTime, Utc};

/// Maximum sanitized title length in the result key.
const MAX_TITLE_LEN: usize = 50;

/// Key of the uploaded source video.
pub fn source_key(user_id: &str, upload_id: &str) -> String {
    format!("uploads/{}/{}/source.mp4", user_id, upload_id)
}

/// Key of the result workbook for a given title and completion time.
pub fn result_key(user_id: &str, upload_id: &str, title: &str, completed_at: DateTime<Utc>) -> String {
    format!(
        "results/{}/{}/{}_{}.xlsx",
        user_id,
        upload_id,
        sanitize_title(title),
        utc_file_timestamp(completed_at)
    )
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_` and cap at
/// 50 characters.
pub fn sanitize_title(title: &str) -> String {
    let stem = title.rsplit_once('.').map(|(s, _)| s).unwrap_or(title);
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(MAX_TITLE_LEN)
        .collect()
}

/// ISO-8601 timestamp made filename-safe: `:` and `.` become `-`.
pub fn utc_file_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}
