//! Core domain types for the Barge chunked transfer system.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Chunk plan math (fixed-size chunking of a known-length file)
//! - Content hashes and incremental hashing
//! - Upload lifecycle status
//! - HTTP wire types for init / chunk / finalize / cleanup
//! - Configuration for the server and the client engine

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod upload;

pub use chunk::{ChunkSpec, chunk_count, chunk_plan};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use upload::UploadStatus;

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum chunk size: 64 MiB
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Minimum chunk size: 64 KiB
pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;
