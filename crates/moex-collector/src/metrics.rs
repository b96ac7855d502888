//! Prometheus metrics for the collector

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, Encoder, Gauge, IntCounter,
    IntCounterVec, TextEncoder,
};

const LABEL_OUTCOME: &str = "outcome";

/// Cycles run, by outcome (published, idle, fetch_error, publish_error, cancelled)
static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "moex_collector_cycles_total",
        "Collection cycles by outcome",
        &[LABEL_OUTCOME]
    )
    .expect("Failed to register cycles_total metric")
});

static TRADES_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "moex_collector_trades_published_total",
        "Trades acknowledged by the broker"
    )
    .expect("Failed to register trades_published_total metric")
});

static ROWS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "moex_collector_rows_skipped_total",
        "Response rows dropped because a required field could not be decoded"
    )
    .expect("Failed to register rows_skipped_total metric")
});

static PUBLISH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "moex_collector_publish_failures_total",
        "Publishes that were not acknowledged"
    )
    .expect("Failed to register publish_failures_total metric")
});

static CHECKPOINT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "moex_collector_checkpoint_failures_total",
        "Watermark saves that failed after a fully published batch"
    )
    .expect("Failed to register checkpoint_failures_total metric")
});

static LAST_SUCCESS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "moex_collector_last_success_timestamp",
        "Unix timestamp of the last cycle that finished without error"
    )
    .expect("Failed to register last_success_timestamp metric")
});

/// Handle for recording collector metrics
#[derive(Clone, Default)]
pub struct CollectorMetrics;

impl CollectorMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_cycle(&self, outcome: &str) {
        CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_success(&self) {
        LAST_SUCCESS.set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn add_published(&self, count: usize) {
        TRADES_PUBLISHED.inc_by(count as u64);
    }

    pub fn add_skipped_rows(&self, count: usize) {
        ROWS_SKIPPED.inc_by(count as u64);
    }

    pub fn inc_publish_failures(&self) {
        PUBLISH_FAILURES.inc();
    }

    pub fn inc_checkpoint_failures(&self) {
        CHECKPOINT_FAILURES.inc();
    }
}

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
