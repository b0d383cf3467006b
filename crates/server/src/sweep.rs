//! Stale upload sweeping.
//!
//! An upload stuck in UPLOADING with no activity for longer than the
//! configured TTL is presumed abandoned: its blob is removed and the record
//! transitions to FAILED. Staleness is measured against `updated_at`, which
//! every chunk receipt touches, so a live upload inside its backoff window is
//! never swept.

use crate::error::ApiResult;
use crate::metrics::UPLOADS_SWEPT;
use crate::state::{AppState, blob_key};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Uploads processed per sweep batch.
const SWEEP_BATCH: u32 = 100;

/// Run one sweep pass and return the number of uploads cleaned.
pub async fn sweep_stale(state: &AppState) -> ApiResult<u64> {
    let cutoff = OffsetDateTime::now_utc() - state.config.server.stale_ttl();
    let mut cleaned: u64 = 0;

    loop {
        let batch = state.metadata.get_stale_uploads(cutoff, SWEEP_BATCH).await?;
        if batch.is_empty() {
            break;
        }

        for upload in &batch {
            if let Err(e) = state.storage.delete(&blob_key(upload.upload_id)).await {
                tracing::warn!(
                    upload_id = %upload.upload_id,
                    error = %e,
                    "Failed to delete blob of stale upload"
                );
            }

            state
                .metadata
                .fail_upload(
                    upload.upload_id,
                    Some("stale upload swept"),
                    OffsetDateTime::now_utc(),
                )
                .await?;

            cleaned += 1;
            tracing::info!(
                upload_id = %upload.upload_id,
                filename = %upload.filename,
                updated_at = %upload.updated_at,
                "Swept stale upload"
            );
        }

        if batch.len() < SWEEP_BATCH as usize {
            break;
        }
    }

    if cleaned > 0 {
        UPLOADS_SWEPT.inc_by(cleaned);
    }
    Ok(cleaned)
}

/// Spawn the periodic background sweeper. Returns None when disabled.
pub fn spawn_sweeper(state: AppState) -> Option<JoinHandle<()>> {
    let interval_secs = state.config.server.sweep_interval_secs;
    if interval_secs == 0 {
        tracing::info!("Background sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            match sweep_stale(&state).await {
                Ok(0) => {}
                Ok(cleaned) => {
                    tracing::info!(cleaned = cleaned, "Background sweep finished");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Background sweep failed");
                }
            }
        }
    }))
}
