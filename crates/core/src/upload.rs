//! Upload lifecycle status and HTTP wire types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the zero-based chunk index (informational; the URL path
/// segment is canonical).
pub const CHUNK_INDEX_HEADER: &str = "x-chunk-index";

/// Header carrying the absolute file offset of the chunk body. Authoritative
/// for placement on the server.
pub const CHUNK_OFFSET_HEADER: &str = "x-chunk-offset";

/// Status string stored for a received chunk. Absence of a chunk record means
/// the chunk has not been uploaded.
pub const CHUNK_STATUS_UPLOADED: &str = "UPLOADED";

/// Sentinel entry list returned when a finalized blob is not a readable ZIP
/// archive. Informational, not an error.
pub const NOT_A_ZIP_SENTINEL: &str = "(Not a valid ZIP archive)";

/// Upload lifecycle status.
///
/// Legal transitions: UPLOADING -> PROCESSING -> {COMPLETED, FAILED}, plus
/// UPLOADING -> FAILED directly. COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Canonical status string as stored in the durable store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "UPLOADING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "UPLOADING" => Ok(Self::Uploading),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uploading, Self::Processing)
                | (Self::Uploading, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for `POST /api/upload/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    /// Client-supplied display name. Never used as a filesystem path.
    pub filename: String,
    pub total_size: u64,
    pub total_chunks: u64,
    /// Chunk size the client planned with. Defaults to the server's
    /// configured chunk size when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

/// Response body for `POST /api/upload/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: String,
    pub status: UploadStatus,
    /// Indexes already durably received; the client skips these on resume.
    pub uploaded_chunks: Vec<u64>,
}

/// Response body for a successful chunk PUT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAck {
    pub success: bool,
}

/// Request body for `POST /api/upload/{id}/finalize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    /// Optional client-computed SHA-256 (lowercase hex) to verify against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_hash: Option<String>,
}

/// Response body for a successful finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub status: UploadStatus,
    pub upload_id: String,
    /// Lowercase hex SHA-256 of the assembled blob.
    pub hash: String,
    /// ZIP entry names, or the not-a-ZIP sentinel.
    pub zip_content: Vec<String>,
}

/// Response body for `DELETE /api/files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub cleaned: u64,
}

/// Response body for `GET /api/upload/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStateResponse {
    pub upload_id: String,
    pub status: UploadStatus,
    pub total_chunks: u64,
    pub uploaded_chunks: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_hash: Option<String>,
}
