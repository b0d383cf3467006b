//! Single-winner upload finalization.
//!
//! Exactly one finalizer performs the hash-and-commit work; concurrent or
//! repeated requests observe the winner's outcome (409 while PROCESSING, the
//! stored result once COMPLETED).

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{parse_upload_id, read_json_body};
use crate::metrics::{FINALIZE_DURATION, UPLOADS_COMPLETED, UPLOADS_FAILED, record_upload_error};
use crate::state::{AppState, blob_key};
use axum::Json;
use axum::extract::{Path, Request, State};
use barge_core::ContentHash;
use barge_core::upload::{FinalizeRequest, FinalizeResponse, NOT_A_ZIP_SENTINEL, UploadStatus};
use barge_metadata::FinalizeClaim;
use barge_metadata::models::UploadRow;
use futures::StreamExt;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// POST /api/upload/{upload_id}/finalize - Verify and commit an upload.
#[tracing::instrument(skip(state, req), fields(upload_id = %upload_id))]
pub async fn finalize_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    req: Request,
) -> ApiResult<Json<FinalizeResponse>> {
    let start_time = Instant::now();
    let upload_id = parse_upload_id(&upload_id)?;
    let body: FinalizeRequest = read_json_body(req).await?;

    let upload = state
        .metadata
        .get_upload(upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload not found".to_string()))?;

    match UploadStatus::parse(&upload.status)
        .map_err(|e| ApiError::Internal(format!("corrupt status column: {e}")))?
    {
        UploadStatus::Completed => return completed_replay(&state, &upload).await,
        UploadStatus::Failed => {
            return Err(ApiError::BadRequest("upload is FAILED".to_string()));
        }
        UploadStatus::Processing => {
            return Err(ApiError::Conflict("upload is being finalized".to_string()));
        }
        UploadStatus::Uploading => {}
    }

    // All chunk records must be present before the status transition; an
    // early finalize returns 400 without mutating anything so the client can
    // keep uploading.
    let received = state.metadata.count_chunks(upload_id).await?;
    if received < upload.total_chunks {
        record_upload_error("incomplete_finalize");
        return Err(ApiError::IncompleteUpload {
            missing: (upload.total_chunks - received) as u64,
        });
    }

    // Atomic UPLOADING -> PROCESSING; losers observe the row post-transition.
    let now = OffsetDateTime::now_utc();
    let claim = state
        .metadata
        .begin_processing(upload_id, now)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload not found".to_string()))?;

    let upload = match claim {
        FinalizeClaim::Claimed(row) => row,
        FinalizeClaim::Observed(row) => {
            return match row.status.as_str() {
                s if s == UploadStatus::Completed.as_str() => {
                    completed_replay(&state, &row).await
                }
                s if s == UploadStatus::Failed.as_str() => {
                    Err(ApiError::BadRequest("upload is FAILED".to_string()))
                }
                _ => Err(ApiError::Conflict("upload is being finalized".to_string())),
            };
        }
    };

    tracing::info!(upload_id = %upload_id, "Finalizing upload");

    let key = blob_key(upload_id);
    let server_hash = match hash_blob(&state, &key, upload.total_size as u64).await {
        Ok(hash) => hash,
        Err(e) => {
            record_upload_error("finalize_hash_failed");
            fail(&state, upload_id, &e.to_string()).await;
            return Err(e);
        }
    };

    if let Some(client_hash) = body.client_hash.as_deref() {
        let client_hash = client_hash.to_lowercase();
        if client_hash != server_hash {
            record_upload_error("hash_mismatch");
            tracing::warn!(
                upload_id = %upload_id,
                server_hash = %server_hash,
                client_hash = %client_hash,
                "Client hash mismatch"
            );
            fail(&state, upload_id, "client hash mismatch").await;
            return Err(ApiError::HashMismatch {
                server_hash,
                client_hash,
            });
        }
    }

    let zip_content = zip_entry_names(&state, &key).await;

    state
        .metadata
        .complete_upload(upload_id, &server_hash, OffsetDateTime::now_utc())
        .await?;

    UPLOADS_COMPLETED.inc();
    FINALIZE_DURATION.observe(start_time.elapsed().as_secs_f64());
    tracing::info!(upload_id = %upload_id, hash = %server_hash, "Upload completed");

    Ok(Json(FinalizeResponse {
        status: UploadStatus::Completed,
        upload_id: upload_id.to_string(),
        hash: server_hash,
        zip_content,
    }))
}

/// Idempotent response for an already-COMPLETED upload.
async fn completed_replay(state: &AppState, upload: &UploadRow) -> ApiResult<Json<FinalizeResponse>> {
    let hash = upload.final_hash.clone().ok_or_else(|| {
        ApiError::Internal("completed upload is missing its final hash".to_string())
    })?;

    // The entry list is not persisted; re-reading the central directory is a
    // bounded amount of work against the stored blob.
    let zip_content = zip_entry_names(state, &blob_key(upload.upload_id)).await;

    Ok(Json(FinalizeResponse {
        status: UploadStatus::Completed,
        upload_id: upload.upload_id.to_string(),
        hash,
        zip_content,
    }))
}

/// Stream the blob through an incremental hasher, never materializing it.
async fn hash_blob(state: &AppState, key: &str, expected_size: u64) -> ApiResult<String> {
    let mut stream = state.storage.read_stream(key).await?;
    let mut hasher = ContentHash::hasher();
    let mut hashed: u64 = 0;

    while let Some(piece) = stream.next().await {
        let bytes = piece?;
        hasher.update(&bytes);
        hashed += bytes.len() as u64;
    }

    // A short blob here means a chunk record exists without its bytes, which
    // indicates storage loss after the completeness check.
    if hashed != expected_size {
        return Err(ApiError::Internal(format!(
            "assembled blob is {hashed} bytes, expected {expected_size}"
        )));
    }

    Ok(hasher.finalize().to_hex())
}

/// Collect ZIP entry names from the blob's central directory without
/// decompressing entry contents. Non-archives yield the sentinel list.
async fn zip_entry_names(state: &AppState, key: &str) -> Vec<String> {
    let file = match state.storage.open_std(key).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to open blob for archive peek");
            return vec![NOT_A_ZIP_SENTINEL.to_string()];
        }
    };

    tokio::task::spawn_blocking(move || match zip::ZipArchive::new(file) {
        Ok(mut archive) => {
            let mut names = Vec::with_capacity(archive.len());
            for i in 0..archive.len() {
                match archive.by_index(i) {
                    Ok(entry) => names.push(entry.name().to_string()),
                    Err(e) => {
                        tracing::debug!(index = i, error = %e, "Skipping unreadable ZIP entry");
                    }
                }
            }
            names
        }
        Err(_) => vec![NOT_A_ZIP_SENTINEL.to_string()],
    })
    .await
    .unwrap_or_else(|_| vec![NOT_A_ZIP_SENTINEL.to_string()])
}

/// Mark the upload FAILED, logging rather than propagating secondary errors.
async fn fail(state: &AppState, upload_id: Uuid, detail: &str) {
    UPLOADS_FAILED.inc();
    if let Err(e) = state
        .metadata
        .fail_upload(upload_id, Some(detail), OffsetDateTime::now_utc())
        .await
    {
        tracing::error!(
            upload_id = %upload_id,
            error = %e,
            "Failed to mark upload as FAILED"
        );
    }
}
