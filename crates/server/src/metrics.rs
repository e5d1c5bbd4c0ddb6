//! Prometheus metrics for the vault server.
//!
//! Counters cover the chunked upload lifecycle (sessions, parts, bytes,
//! completion latency) and the expiry sweep. No per-user labels are used.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Restrict it to scraper addresses at the network layer.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::new(name, help).expect("metric creation failed")
}

// Session lifecycle
pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_upload_sessions_created_total",
        "Total number of chunked upload sessions created",
    )
});

pub static UPLOAD_SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_upload_sessions_completed_total",
        "Total number of chunked upload sessions finalized into a file",
    )
});

pub static UPLOAD_SESSIONS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_upload_sessions_aborted_total",
        "Total number of chunked upload sessions aborted by their owner",
    )
});

pub static UPLOAD_SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_upload_sessions_expired_total",
        "Total number of upload sessions removed by the expiry sweep",
    )
});

pub static ACTIVE_UPLOAD_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "vault_active_upload_sessions",
        "Live upload sessions as of the last sweep",
    )
    .expect("metric creation failed")
});

// Data
pub static PARTS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter("vault_parts_uploaded_total", "Total number of parts stored")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_bytes_uploaded_total",
        "Total bytes accepted, counting re-uploaded parts again",
    )
});

pub static FILES_CREATED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_files_created_total",
            "Total file records created, by upload path",
        ),
        &["path"],
    )
    .expect("metric creation failed")
});

// Timing
pub static UPLOAD_COMPLETE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_upload_complete_duration_seconds",
            "Time taken to reassemble and finalize a chunked upload",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static PART_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_part_upload_duration_seconds",
            "Time taken to store a single part",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

// Errors
pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_upload_errors_total",
            "Total upload errors by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static RATE_LIMITED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_rate_limited_total",
        "Total requests rejected by the rate limiter",
    )
});

// Sweep
pub static SWEEP_RUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter("vault_sweep_runs_total", "Total expiry sweep runs")
});

pub static SWEEP_ORPHANS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_sweep_orphans_deleted_total",
        "Total orphaned part namespaces removed by the sweep",
    )
});

pub static SWEEP_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "vault_sweep_errors_total",
        "Total errors encountered while sweeping",
    )
});

pub static SWEEP_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("vault_sweep_duration_seconds", "Expiry sweep duration")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(UPLOAD_SESSIONS_CREATED.clone()),
            Box::new(UPLOAD_SESSIONS_COMPLETED.clone()),
            Box::new(UPLOAD_SESSIONS_ABORTED.clone()),
            Box::new(UPLOAD_SESSIONS_EXPIRED.clone()),
            Box::new(ACTIVE_UPLOAD_SESSIONS.clone()),
            Box::new(PARTS_UPLOADED.clone()),
            Box::new(BYTES_UPLOADED.clone()),
            Box::new(FILES_CREATED.clone()),
            Box::new(UPLOAD_COMPLETE_DURATION.clone()),
            Box::new(PART_UPLOAD_DURATION.clone()),
            Box::new(UPLOAD_ERRORS.clone()),
            Box::new(RATE_LIMITED_TOTAL.clone()),
            Box::new(SWEEP_RUNS.clone()),
            Box::new(SWEEP_ORPHANS_DELETED.clone()),
            Box::new(SWEEP_ERRORS.clone()),
            Box::new(SWEEP_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count an upload error under its stable reason code.
pub fn record_upload_error(reason: &str) {
    UPLOAD_ERRORS.with_label_values(&[reason]).inc();
}
