//! Shared handler helpers and ambient endpoints.

use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::extract::Request;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Maximum request body size for JSON control-plane requests (1 MiB).
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// GET /health - liveness probe (intentionally unauthenticated).
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Parse a path segment as an upload ID.
pub fn parse_upload_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid upload ID: {e}")))
}

/// Read and deserialize a JSON request body with a size cap.
///
/// An empty body deserializes as `{}` so finalize can be called without a
/// payload.
pub async fn read_json_body<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    if bytes.is_empty() {
        return serde_json::from_slice(b"{}")
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")));
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upload_id_rejects_garbage() {
        assert!(parse_upload_id("not-a-uuid").is_err());
        parse_upload_id("00000000-0000-0000-0000-000000000000").unwrap();
    }
}
