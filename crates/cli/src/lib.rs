//! Client upload engine for the Barge transfer system.
//!
//! The engine plans a file into fixed-size chunks, learns already-present
//! chunks from the server, uploads with bounded concurrency and per-chunk
//! retry, and triggers finalization once every chunk is durable. Progress is
//! reported over an event channel after every state-changing step.

pub mod api;
pub mod engine;
pub mod progress;

pub use api::{ApiClient, RequestError};
pub use engine::{EngineError, EngineOptions, UploadEngine};
pub use progress::{ChunkState, EngineEvent, EngineStatus, ProgressSnapshot};
