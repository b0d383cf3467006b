//! Prometheus metrics for the Barge server.
//!
//! Exposes counters for upload lifecycle events and histograms for chunk
//! writes and finalization. The `/metrics` endpoint is unauthenticated to
//! allow Prometheus scraping; restrict it at the infrastructure level when
//! the server is reachable from untrusted networks.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOADS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("barge_uploads_created_total", "Total uploads created")
        .expect("metric creation failed")
});

pub static UPLOADS_RESUMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("barge_uploads_resumed_total", "Total uploads resumed")
        .expect("metric creation failed")
});

pub static UPLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "barge_uploads_completed_total",
        "Total uploads finalized as COMPLETED",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "barge_uploads_failed_total",
        "Total uploads transitioned to FAILED",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "barge_uploads_swept_total",
        "Total stale uploads removed by the sweep",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("barge_chunks_received_total", "Total chunk PUTs accepted")
        .expect("metric creation failed")
});

pub static BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("barge_bytes_received_total", "Total chunk bytes accepted")
        .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("barge_upload_errors_total", "Upload errors by reason"),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static CHUNK_WRITE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "barge_chunk_write_duration_seconds",
        "Time to persist one chunk (blob write + record upsert)",
    ))
    .expect("metric creation failed")
});

pub static FINALIZE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "barge_finalize_duration_seconds",
        "Time to hash, verify, and commit an upload",
    ))
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(UPLOADS_CREATED.clone()),
            Box::new(UPLOADS_RESUMED.clone()),
            Box::new(UPLOADS_COMPLETED.clone()),
            Box::new(UPLOADS_FAILED.clone()),
            Box::new(UPLOADS_SWEPT.clone()),
            Box::new(CHUNKS_RECEIVED.clone()),
            Box::new(BYTES_RECEIVED.clone()),
            Box::new(UPLOAD_ERRORS.clone()),
            Box::new(CHUNK_WRITE_DURATION.clone()),
            Box::new(FINALIZE_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// Record an upload error by reason label.
pub fn record_upload_error(reason: &str) {
    UPLOAD_ERRORS.with_label_values(&[reason]).inc();
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }
    (
        StatusCode::OK,
        [("Content-Type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        register_metrics();
        register_metrics();
        UPLOADS_CREATED.inc();
        assert!(UPLOADS_CREATED.get() >= 1);
    }
}
