//! Structured job logging.
//!
//! Every error path must log `upload_id` plus the step name; this
//! helper keeps that shape consistent.

use tracing::{error, info, warn, Span};

/// Job logger carrying the upload id and current step.
#[derive(Debug, Clone)]
pub struct JobLogger {
    upload_id: String,
    step: String,
}

impl JobLogger {
    pub fn new(upload_id: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            step: step.into(),
        }
    }

    /// Same job, different step.
    pub fn step(&self, step: impl Into<String>) -> Self {
        Self {
            upload_id: self.upload_id.clone(),
            step: step.into(),
        }
    }

    pub fn start(&self, message: &str) {
        info!(upload_id = %self.upload_id, step = %self.step, "{}", message);
    }

    pub fn progress(&self, message: &str) {
        info!(upload_id = %self.upload_id, step = %self.step, "{}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(upload_id = %self.upload_id, step = %self.step, "{}", message);
    }

    pub fn failure(&self, message: &str) {
        error!(upload_id = %self.upload_id, step = %self.step, "{}", message);
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// A tracing span carrying the job context.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", upload_id = %self.upload_id, step = %self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_keeps_upload_id() {
        let logger = JobLogger::new("up-1", "download");
        let next = logger.step("audio");
        assert_eq!(next.upload_id(), "up-1");
    }
}
