//! Prometheus metrics for the csvgate server.
//!
//! Exposes cache hit/miss counts and regeneration activity. Labels carry
//! outcome categories only, never keys or tokens.
//!
//! The `/metrics` endpoint is unauthenticated; restrict it to scrapers at the
//! network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Cache lookups
pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "csvgate_cache_hits_total",
        "Total number of requests served from a fresh artifact",
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "csvgate_cache_misses_total",
            "Total number of requests that needed a regeneration, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

// Regenerations
pub static REGENERATIONS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "csvgate_regenerations_started_total",
        "Total number of exports started",
    )
    .expect("metric creation failed")
});

pub static REGENERATIONS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "csvgate_regenerations_failed_total",
            "Total number of failed regenerations by error kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static REGENERATION_WAITERS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "csvgate_regeneration_waiters_total",
        "Total number of requests that joined an in-flight regeneration",
    )
    .expect("metric creation failed")
});

pub static STALE_FALLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "csvgate_stale_fallbacks_total",
        "Total number of stale artifacts served after a failed regeneration",
    )
    .expect("metric creation failed")
});

pub static ACTIVE_REGENERATIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "csvgate_active_regenerations",
        "Current number of keys with a regeneration in flight",
    )
    .expect("metric creation failed")
});

// Timing
pub static REGENERATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "csvgate_regeneration_duration_seconds",
            "Time taken to export and publish an artifact",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGENERATIONS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGENERATIONS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGENERATION_WAITERS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STALE_FALLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ACTIVE_REGENERATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGENERATION_DURATION.clone()))
            .expect("metric registration failed");
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
