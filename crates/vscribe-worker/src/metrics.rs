//! Worker metrics.

use metrics::{counter, histogram};

pub fn record_job_started() {
    counter!("vscribe_jobs_started_total").increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!("vscribe_jobs_completed_total").increment(1);
    histogram!("vscribe_job_duration_seconds").record(duration_secs);
}

pub fn record_job_failed() {
    counter!("vscribe_jobs_failed_total").increment(1);
}

pub fn record_ocr_call(provider: &str) {
    counter!("vscribe_ocr_calls_total", "provider" => provider.to_string()).increment(1);
}

pub fn record_transcription_call() {
    counter!("vscribe_transcription_calls_total").increment(1);
}

pub fn record_batch_completed() {
    counter!("vscribe_ocr_batches_total").increment(1);
}
