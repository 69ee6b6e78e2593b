//! Object storage for the SceneScribe backend.
//!
//! Wraps the R2 S3 API for source downloads, transient job-state blobs
//! (scene lists, transcripts, per-batch OCR output, frame images), and
//! result uploads through the `ResultSink` abstraction.

pub mod client;
pub mod error;
pub mod sink;
pub mod state;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use sink::{FsResultSink, R2ResultSink, ResultSink};
pub use state::JobStateStore;
