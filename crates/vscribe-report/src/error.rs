//! Report error types.

use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Workbook generation failed: {0}")]
    Workbook(String),

    #[error("Invalid screenshot for scene {scene_number}: {message}")]
    BadScreenshot { scene_number: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Workbook(e.to_string())
    }
}
