//! Task queue access for the SceneScribe backend.
//!
//! The queue is an HTTP-push task service: the worker creates tasks
//! that the service later delivers as bearer-authenticated POSTs to the
//! worker's own endpoints, retrying on non-2xx with the attempt count
//! in a request header.

pub mod error;
pub mod payload;
pub mod tasks;

pub use error::{QueueError, QueueResult};
pub use payload::{decode_payload, encode_payload};
pub use tasks::{TaskQueueClient, TaskQueueConfig, RETRY_COUNT_HEADER};
