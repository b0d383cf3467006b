//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Upload aggregate record.
///
/// `status` holds a canonical [`barge_core::UploadStatus`] string.
/// `final_hash` is set exactly when the upload is COMPLETED.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub upload_id: Uuid,
    /// Client-supplied display name. Not trusted for filesystem paths.
    pub filename: String,
    pub total_size: i64,
    pub total_chunks: i64,
    /// Negotiated chunk size, recorded for offset validation on chunk PUTs.
    pub chunk_size: i64,
    pub status: String,
    pub final_hash: Option<String>,
    /// Failure cause for diagnostics, set when the upload transitions to FAILED.
    pub error_detail: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Per-chunk receipt record. Absence of a row means the chunk has not been
/// uploaded yet.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub upload_id: Uuid,
    pub chunk_index: i64,
    pub status: String,
    pub received_at: OffsetDateTime,
}
