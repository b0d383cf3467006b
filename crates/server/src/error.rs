//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("Hash mismatch")]
    HashMismatch {
        server_hash: String,
        client_hash: String,
    },

    #[error("incomplete upload: missing {missing} chunks")]
    IncompleteUpload { missing: u64 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] barge_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] barge_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] barge_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::HashMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::IncompleteUpload { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                barge_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                barge_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                barge_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                barge_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                barge_metadata::MetadataError::Constraint(_) => StatusCode::CONFLICT,
                barge_metadata::MetadataError::InvalidStateTransition { .. } => {
                    StatusCode::CONFLICT
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Hash mismatch carries both digests so the client can diagnose
        // which side diverged.
        if let Self::HashMismatch {
            server_hash,
            client_hash,
        } = &self
        {
            let body = serde_json::json!({
                "error": "Hash mismatch",
                "code": self.code(),
                "serverHash": server_hash,
                "clientHash": client_hash,
            });
            return (status, Json(body)).into_response();
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::HashMismatch {
                server_hash: "a".into(),
                client_hash: "b".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::IncompleteUpload { missing: 2 }.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn metadata_conflicts_map_to_409() {
        let err = ApiError::Metadata(barge_metadata::MetadataError::InvalidStateTransition {
            from: "PROCESSING".into(),
            to: "COMPLETED".into(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
