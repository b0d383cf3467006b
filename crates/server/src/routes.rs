//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Upload control plane
        .route("/api/upload/init", post(handlers::init_upload))
        .route("/api/upload/{upload_id}", get(handlers::get_upload_state))
        .route(
            "/api/upload/{upload_id}/chunk/{chunk_index}",
            put(handlers::put_chunk),
        )
        .route(
            "/api/upload/{upload_id}/finalize",
            post(handlers::finalize_upload),
        )
        // Operational cleanup
        .route("/api/files", delete(handlers::cleanup_files))
        // Health check (intentionally unauthenticated for load balancers)
        .route("/health", get(handlers::health_check));

    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)));
    }

    // Browser clients upload directly; the surface is CORS-open by contract.
    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
