//! HTTP server for the Barge chunked transfer system.
//!
//! This crate provides the server-side control plane:
//! - Upload init with resume-by-identity
//! - Out-of-order chunk assembly into sparse blobs
//! - Single-winner finalization with streaming hash verification
//! - Stale upload sweeping

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweep;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
