//! Stale upload cleanup endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use crate::sweep;
use axum::Json;
use axum::extract::State;
use barge_core::upload::CleanupResponse;

/// DELETE /api/files - Sweep stale uploads now.
///
/// Idempotent; the background sweeper runs the same pass on an interval.
#[tracing::instrument(skip(state))]
pub async fn cleanup_files(State(state): State<AppState>) -> ApiResult<Json<CleanupResponse>> {
    let cleaned = sweep::sweep_stale(&state).await?;
    Ok(Json(CleanupResponse { cleaned }))
}
