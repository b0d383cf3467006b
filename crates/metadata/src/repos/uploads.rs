//! Upload repository.

use crate::error::MetadataResult;
use crate::models::UploadRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Outcome of the atomic UPLOADING -> PROCESSING transition.
#[derive(Debug, Clone)]
pub enum FinalizeClaim {
    /// The caller won the transition; the returned row is PROCESSING.
    Claimed(UploadRow),
    /// Another finalizer holds the upload, or it already reached a terminal
    /// state. The returned row carries the status the caller observed.
    Observed(UploadRow),
}

/// Repository for upload records.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Insert a new upload in UPLOADING state.
    async fn create_upload(&self, upload: &UploadRow) -> MetadataResult<()>;

    /// Get an upload by ID.
    async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>>;

    /// Find the most recent UPLOADING upload matching `(filename, total_size)`.
    /// Resume equivalence is by this pair only; collisions across distinct
    /// files with the same name and size are accepted.
    async fn find_resumable(
        &self,
        filename: &str,
        total_size: i64,
    ) -> MetadataResult<Option<UploadRow>>;

    /// Atomically transition UPLOADING -> PROCESSING.
    ///
    /// Implemented as a single conditional update so that exactly one of any
    /// number of concurrent callers observes [`FinalizeClaim::Claimed`]; all
    /// others observe the row as it stood after the winner's transition.
    /// Returns None if the upload does not exist.
    async fn begin_processing(
        &self,
        upload_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<Option<FinalizeClaim>>;

    /// Transition PROCESSING -> COMPLETED and record the final hash.
    async fn complete_upload(
        &self,
        upload_id: Uuid,
        final_hash: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Transition a non-terminal upload to FAILED with an optional cause.
    /// A no-op when the upload is already terminal, so sweeps stay idempotent.
    async fn fail_upload(
        &self,
        upload_id: Uuid,
        error_detail: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Get UPLOADING uploads whose last activity is older than `older_than`.
    async fn get_stale_uploads(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadRow>>;

    /// Delete an upload and (via cascade) its chunk records.
    async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<()>;
}
