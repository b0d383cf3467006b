//! Chunk repository.

use crate::error::MetadataResult;
use crate::models::ChunkRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for per-upload chunk receipt records.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Create or update a chunk record. Re-receiving the same index upserts
    /// the row, so the outcome is identical to a first upload.
    ///
    /// The upsert also touches the parent upload's `updated_at`, which keeps
    /// an actively uploaded session out of the stale sweep window.
    async fn upsert_chunk(&self, chunk: &ChunkRow) -> MetadataResult<()>;

    /// Get one chunk record.
    async fn get_chunk(
        &self,
        upload_id: Uuid,
        chunk_index: i64,
    ) -> MetadataResult<Option<ChunkRow>>;

    /// Get the received chunk indexes for an upload, ascending.
    async fn get_uploaded_indexes(&self, upload_id: Uuid) -> MetadataResult<Vec<i64>>;

    /// Count received chunks for an upload.
    async fn count_chunks(&self, upload_id: Uuid) -> MetadataResult<i64>;

    /// Delete all chunk records for an upload.
    async fn delete_chunks(&self, upload_id: Uuid) -> MetadataResult<()>;
}
