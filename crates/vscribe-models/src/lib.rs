//! Shared data models for the SceneScribe backend.
//!
//! Everything that crosses a crate boundary lives here: job requests,
//! status rows, checkpoints, batch tasks, scenes, transcript segments,
//! and the key/timecode helpers that keep wire formats consistent.

pub mod checkpoint;
pub mod job;
pub mod keys;
pub mod scene;
pub mod status;
pub mod timestamp;
pub mod transcript;

pub use checkpoint::{Checkpoint, CheckpointStep};
pub use job::{BatchTask, DetectionMode, JobInfo, ProcessRequest};
pub use keys::{result_key, sanitize_title, source_key, utc_file_timestamp};
pub use scene::{Scene, SceneCut, VideoMetadata};
pub use status::{
    InterruptCode, JobStatusRow, Phase, PhaseStatus, ProcessingMetadata, Stage, StatusKind,
};
pub use timestamp::format_timecode;
pub use transcript::{sort_and_dedup, SpeechChunk, TranscriptSegment, VoiceSegment};
