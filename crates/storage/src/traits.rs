//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored blob.
#[derive(Clone, Debug)]
pub struct BlobMeta {
    /// Blob size in bytes. During assembly this is the highest written end
    /// offset; holes below it read as zeros.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
}

/// Random-access blob store keyed by upload.
///
/// The store must support concurrent positional writes to disjoint ranges of
/// the same blob; overlapping writes are last-write-wins and must not corrupt
/// adjacent ranges.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Create an empty blob if absent. Returns true if newly created.
    async fn create(&self, key: &str) -> StorageResult<bool>;

    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get a blob's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<BlobMeta>;

    /// Write `data` at the given absolute offset, creating the blob if
    /// missing. Writing past the current end leaves a sparse zero-filled hole.
    async fn write_at(&self, key: &str, offset: u64, data: Bytes) -> StorageResult<()>;

    /// Stream the blob from offset 0 in bounded buffers.
    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Open a blocking handle for synchronous readers (archive introspection
    /// under `spawn_blocking`).
    async fn open_std(&self, key: &str) -> StorageResult<std::fs::File>;

    /// Delete a blob. Deleting an absent blob is a no-op.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Static identifier for the backend type, used for logging.
    fn backend_name(&self) -> &'static str;
}
