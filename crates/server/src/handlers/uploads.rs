//! Upload control plane handlers: init, chunk PUT, and state queries.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{parse_upload_id, read_json_body};
use crate::metrics::{
    BYTES_RECEIVED, CHUNK_WRITE_DURATION, CHUNKS_RECEIVED, UPLOADS_CREATED, UPLOADS_RESUMED,
    record_upload_error,
};
use crate::state::{AppState, blob_key};
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::HeaderMap;
use barge_core::upload::{
    CHUNK_INDEX_HEADER, CHUNK_OFFSET_HEADER, CHUNK_STATUS_UPLOADED, ChunkAck, InitUploadRequest,
    InitUploadResponse, UploadStateResponse,
};
use barge_core::{MIN_CHUNK_SIZE, UploadStatus, chunk};
use barge_metadata::models::{ChunkRow, UploadRow};
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// Slack on top of the negotiated chunk size when reading a chunk body,
/// covering HTTP framing overhead. The exact size check happens after read.
const CHUNK_BODY_SLACK: usize = 1024;

/// Maximum accepted filename length.
const MAX_FILENAME_LEN: usize = 255;

/// POST /api/upload/init - Create a new upload or reattach to an existing one.
///
/// Resume equivalence is by `(filename, total_size)` only. Reattaching
/// returns the chunk indexes already received so the client can skip them.
#[tracing::instrument(skip(state, req), fields(filename))]
pub async fn init_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<InitUploadResponse>> {
    let body: InitUploadRequest = read_json_body(req).await?;

    if body.filename.is_empty() || body.filename.len() > MAX_FILENAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "filename must be between 1 and {MAX_FILENAME_LEN} bytes"
        )));
    }
    tracing::Span::current().record("filename", body.filename.as_str());

    // Values beyond i64 cannot be stored; reject instead of truncating.
    if body.total_size > i64::MAX as u64 {
        return Err(ApiError::BadRequest(format!(
            "total_size {} exceeds maximum supported size {}",
            body.total_size,
            i64::MAX
        )));
    }

    let chunk_size = body.chunk_size.unwrap_or(state.config.server.chunk_size);
    if chunk_size < MIN_CHUNK_SIZE || chunk_size > state.config.server.max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk_size must be between {} and {}",
            MIN_CHUNK_SIZE, state.config.server.max_chunk_size
        )));
    }
    chunk::validate_declared_count(body.total_size, chunk_size, body.total_chunks)?;

    // Reattach to an open upload for the same (filename, total_size) pair.
    if let Some(existing) = state
        .metadata
        .find_resumable(&body.filename, body.total_size as i64)
        .await?
    {
        let params_match = existing.chunk_size == chunk_size as i64
            && existing.total_chunks == body.total_chunks as i64;

        if !params_match {
            // The client re-planned with a different chunk size; the old
            // blob's offsets no longer line up, so the session is useless.
            tracing::info!(
                upload_id = %existing.upload_id,
                "Init parameters changed, invalidating old upload"
            );
            if let Err(e) = state.storage.delete(&blob_key(existing.upload_id)).await {
                tracing::warn!(
                    upload_id = %existing.upload_id,
                    error = %e,
                    "Failed to delete blob of invalidated upload"
                );
            }
            state.metadata.delete_upload(existing.upload_id).await?;
            // Fall through to create a new upload
        } else if state.storage.exists(&blob_key(existing.upload_id)).await? {
            let uploaded = state
                .metadata
                .get_uploaded_indexes(existing.upload_id)
                .await?;

            UPLOADS_RESUMED.inc();
            tracing::info!(
                upload_id = %existing.upload_id,
                uploaded_chunks = uploaded.len(),
                "Resumed existing upload"
            );

            return Ok(Json(InitUploadResponse {
                upload_id: existing.upload_id.to_string(),
                status: UploadStatus::Uploading,
                uploaded_chunks: uploaded.into_iter().map(|i| i as u64).collect(),
            }));
        } else {
            // Upload record survived a blob loss (disk wipe between restarts).
            // Chunk records are now meaningless; restart from scratch.
            tracing::warn!(
                upload_id = %existing.upload_id,
                "Blob missing for resumable upload, resetting chunk records"
            );
            state.metadata.delete_chunks(existing.upload_id).await?;
            state.storage.create(&blob_key(existing.upload_id)).await?;

            return Ok(Json(InitUploadResponse {
                upload_id: existing.upload_id.to_string(),
                status: UploadStatus::Uploading,
                uploaded_chunks: Vec::new(),
            }));
        }
    }

    let upload_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    let upload = UploadRow {
        upload_id,
        filename: body.filename.clone(),
        total_size: body.total_size as i64,
        total_chunks: body.total_chunks as i64,
        chunk_size: chunk_size as i64,
        status: UploadStatus::Uploading.as_str().to_string(),
        final_hash: None,
        error_detail: None,
        created_at: now,
        updated_at: now,
    };

    state.metadata.create_upload(&upload).await?;
    state.storage.create(&blob_key(upload_id)).await?;

    UPLOADS_CREATED.inc();
    tracing::info!(
        upload_id = %upload_id,
        total_size = body.total_size,
        total_chunks = body.total_chunks,
        "Created new upload"
    );

    Ok(Json(InitUploadResponse {
        upload_id: upload_id.to_string(),
        status: UploadStatus::Uploading,
        uploaded_chunks: Vec::new(),
    }))
}

/// Parse the authoritative chunk offset header.
fn parse_offset_header(headers: &HeaderMap) -> ApiResult<u64> {
    let value = headers.get(CHUNK_OFFSET_HEADER).ok_or_else(|| {
        ApiError::BadRequest(format!("missing {CHUNK_OFFSET_HEADER} header"))
    })?;
    value
        .to_str()
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {CHUNK_OFFSET_HEADER} header")))
}

/// Cross-check the informational index header against the path segment.
fn check_index_header(headers: &HeaderMap, chunk_index: u64) -> ApiResult<()> {
    if let Some(value) = headers.get(CHUNK_INDEX_HEADER) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                ApiError::BadRequest(format!("invalid {CHUNK_INDEX_HEADER} header"))
            })?;
        if parsed != chunk_index {
            return Err(ApiError::BadRequest(format!(
                "{CHUNK_INDEX_HEADER} header {parsed} does not match path index {chunk_index}"
            )));
        }
    }
    Ok(())
}

/// Validate chunk placement against the upload's negotiated geometry.
fn validate_chunk_placement(
    upload: &UploadRow,
    chunk_index: u64,
    offset: u64,
    body_len: u64,
) -> ApiResult<()> {
    if chunk_index >= upload.total_chunks as u64 {
        return Err(ApiError::BadRequest(format!(
            "chunk index {} out of range (upload has {} chunks)",
            chunk_index, upload.total_chunks
        )));
    }

    if body_len > upload.chunk_size as u64 {
        return Err(ApiError::BadRequest(format!(
            "chunk body {} bytes exceeds chunk size {}",
            body_len, upload.chunk_size
        )));
    }

    // The offset header is authoritative for placement, but it must agree
    // with the fixed-size plan so a misbehaving client cannot scribble at
    // arbitrary positions.
    let expected = chunk_index * upload.chunk_size as u64;
    if offset != expected {
        return Err(ApiError::BadRequest(format!(
            "offset {offset} does not match chunk {chunk_index} (expected {expected})"
        )));
    }

    if offset + body_len > upload.total_size as u64 {
        return Err(ApiError::BadRequest(format!(
            "offset {} + length {} exceeds total size {}",
            offset, body_len, upload.total_size
        )));
    }

    Ok(())
}

/// PUT /api/upload/{upload_id}/chunk/{chunk_index} - Write one chunk.
///
/// Chunks arrive in any order; re-uploading an index overwrites the same
/// byte range and upserts the same record, so the operation is idempotent.
#[tracing::instrument(skip(state, req), fields(upload_id = %upload_id, chunk_index = chunk_index))]
pub async fn put_chunk(
    State(state): State<AppState>,
    Path((upload_id, chunk_index)): Path<(String, u64)>,
    req: Request,
) -> ApiResult<Json<ChunkAck>> {
    let start_time = Instant::now();

    let upload_id = parse_upload_id(&upload_id)?;
    let offset = parse_offset_header(req.headers())?;
    check_index_header(req.headers(), chunk_index)?;

    let upload = state
        .metadata
        .get_upload(upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload not found".to_string()))?;

    if upload.status != UploadStatus::Uploading.as_str() {
        record_upload_error("chunk_after_terminal");
        return Err(ApiError::BadRequest(format!(
            "upload is {}, not UPLOADING",
            upload.status
        )));
    }

    let body = axum::body::to_bytes(
        req.into_body(),
        upload.chunk_size as usize + CHUNK_BODY_SLACK,
    )
    .await
    .map_err(|e| ApiError::BadRequest(format!("failed to read chunk body: {e}")))?;

    validate_chunk_placement(&upload, chunk_index, offset, body.len() as u64)?;

    let body_len = body.len() as u64;
    state
        .storage
        .write_at(&blob_key(upload_id), offset, body)
        .await?;

    let chunk_row = ChunkRow {
        upload_id,
        chunk_index: chunk_index as i64,
        status: CHUNK_STATUS_UPLOADED.to_string(),
        received_at: OffsetDateTime::now_utc(),
    };
    state.metadata.upsert_chunk(&chunk_row).await?;

    CHUNKS_RECEIVED.inc();
    BYTES_RECEIVED.inc_by(body_len);
    CHUNK_WRITE_DURATION.observe(start_time.elapsed().as_secs_f64());

    tracing::debug!(
        upload_id = %upload_id,
        chunk_index = chunk_index,
        offset = offset,
        len = body_len,
        "Chunk written"
    );

    Ok(Json(ChunkAck { success: true }))
}

/// GET /api/upload/{upload_id} - Query upload state and received chunks.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn get_upload_state(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStateResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;

    let upload = state
        .metadata
        .get_upload(upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload not found".to_string()))?;

    let uploaded = state.metadata.get_uploaded_indexes(upload_id).await?;
    let status = UploadStatus::parse(&upload.status)
        .map_err(|e| ApiError::Internal(format!("corrupt status column: {e}")))?;

    Ok(Json(UploadStateResponse {
        upload_id: upload_id.to_string(),
        status,
        total_chunks: upload.total_chunks as u64,
        uploaded_chunks: uploaded.into_iter().map(|i| i as u64).collect(),
        final_hash: upload.final_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn build_upload(total_size: i64, total_chunks: i64, chunk_size: i64) -> UploadRow {
        let now = OffsetDateTime::now_utc();
        UploadRow {
            upload_id: Uuid::new_v4(),
            filename: "test.bin".to_string(),
            total_size,
            total_chunks,
            chunk_size,
            status: UploadStatus::Uploading.as_str().to_string(),
            final_hash: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn offset_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(parse_offset_header(&headers).is_err());

        headers.insert(CHUNK_OFFSET_HEADER, HeaderValue::from_static("1048576"));
        assert_eq!(parse_offset_header(&headers).unwrap(), 1_048_576);

        headers.insert(CHUNK_OFFSET_HEADER, HeaderValue::from_static("-1"));
        assert!(parse_offset_header(&headers).is_err());

        headers.insert(CHUNK_OFFSET_HEADER, HeaderValue::from_static("abc"));
        assert!(parse_offset_header(&headers).is_err());
    }

    #[test]
    fn index_header_must_match_path() {
        let mut headers = HeaderMap::new();
        check_index_header(&headers, 3).unwrap();

        headers.insert(CHUNK_INDEX_HEADER, HeaderValue::from_static("3"));
        check_index_header(&headers, 3).unwrap();

        headers.insert(CHUNK_INDEX_HEADER, HeaderValue::from_static("4"));
        assert!(check_index_header(&headers, 3).is_err());
    }

    #[test]
    fn placement_validation() {
        let upload = build_upload(2_500_000, 3, 1_000_000);

        validate_chunk_placement(&upload, 0, 0, 1_000_000).unwrap();
        validate_chunk_placement(&upload, 2, 2_000_000, 500_000).unwrap();

        // index out of range
        assert!(validate_chunk_placement(&upload, 3, 3_000_000, 1).is_err());
        // offset disagrees with index
        assert!(validate_chunk_placement(&upload, 1, 999_999, 1_000_000).is_err());
        // body larger than chunk size
        assert!(validate_chunk_placement(&upload, 0, 0, 1_000_001).is_err());
        // tail overruns total size
        assert!(validate_chunk_placement(&upload, 2, 2_000_000, 600_000).is_err());
    }
}
