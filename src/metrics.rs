/// Metrics for the identity client
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Publish outcomes and end-to-end latency
/// - Node calls by operation and result
/// - Resolutions and cache hit/miss rates
/// - Local proof-of-work time

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};
use tracing::error;

lazy_static! {
    // ========== Publish Metrics ==========

    /// Publish attempts by outcome
    pub static ref PUBLISH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "identity_publish_total",
        "Total number of document publishes",
        &["outcome"]
    )
    .unwrap();

    /// Time from submission to confirmed inclusion
    pub static ref PUBLISH_DURATION_SECONDS: Histogram = register_histogram!(
        "identity_publish_duration_seconds",
        "Publish latencies in seconds",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .unwrap();

    /// Local proof-of-work search time
    pub static ref POW_DURATION_SECONDS: Histogram = register_histogram!(
        "identity_pow_duration_seconds",
        "Proof-of-work search time in seconds",
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    )
    .unwrap();

    // ========== Node Metrics ==========

    /// Node calls by operation and result
    pub static ref NODE_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "identity_node_calls_total",
        "Total number of ledger node calls",
        &["operation", "result"]
    )
    .unwrap();

    // ========== Resolution Metrics ==========

    /// Resolutions by source and outcome
    pub static ref RESOLVE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "identity_resolve_total",
        "Total number of DID resolutions",
        &["source", "outcome"]
    )
    .unwrap();

    /// Cache hits by cache type
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "identity_cache_hits_total",
        "Total number of cache hits",
        &["cache_type"]
    )
    .unwrap();

    /// Cache misses by cache type
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "identity_cache_misses_total",
        "Total number of cache misses",
        &["cache_type"]
    )
    .unwrap();

    /// Entries currently held by the resolution cache
    pub static ref CACHE_SIZE: IntGauge = register_int_gauge!(
        "identity_cache_size",
        "Number of entries in the resolution cache"
    )
    .unwrap();

    // ========== Error Metrics ==========

    /// Errors by kind and operation
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "identity_errors_total",
        "Total number of errors",
        &["error_type", "operation"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a finished publish
pub fn record_publish(outcome: &str, duration: f64) {
    PUBLISH_TOTAL.with_label_values(&[outcome]).inc();
    if outcome == "confirmed" {
        PUBLISH_DURATION_SECONDS.observe(duration);
    }
}

/// Record a local proof-of-work run
pub fn record_pow(duration: f64) {
    POW_DURATION_SECONDS.observe(duration);
}

/// Record a single node call
pub fn record_node_call(operation: &str, success: bool) {
    NODE_CALLS_TOTAL
        .with_label_values(&[operation, if success { "success" } else { "failure" }])
        .inc();
}

/// Record a resolution
pub fn record_resolution(from_cache: bool, success: bool) {
    RESOLVE_TOTAL
        .with_label_values(&[
            if from_cache { "cache" } else { "ledger" },
            if success { "success" } else { "failure" },
        ])
        .inc();
}

/// Record a cache access
pub fn record_cache_access(cache_type: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_type]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_type]).inc();
    }
}

pub fn set_cache_size(entries: usize) {
    CACHE_SIZE.set(entries as i64);
}

/// Record an error
pub fn record_error(error_type: &str, operation: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, operation])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_publish() {
        record_publish("confirmed", 1.5);
        record_publish("failed", 0.2);
        let metrics = render_metrics();
        assert!(metrics.contains("identity_publish_total"));
        assert!(metrics.contains("identity_publish_duration_seconds"));
    }

    #[test]
    fn test_record_node_call() {
        record_node_call("submit", true);
        record_node_call("submit", false);
        let metrics = render_metrics();
        assert!(metrics.contains("identity_node_calls_total"));
    }

    #[test]
    fn test_record_cache_access() {
        record_cache_access("resolution", true);
        record_cache_access("resolution", false);
        let metrics = render_metrics();
        assert!(metrics.contains("identity_cache_hits_total"));
        assert!(metrics.contains("identity_cache_misses_total"));
    }

    #[test]
    fn test_metrics_rendering() {
        record_resolution(false, true);
        record_pow(0.01);
        record_error("transport", "submit");

        let metrics = render_metrics();
        assert!(metrics.contains("# HELP"));
        assert!(metrics.contains("# TYPE"));
        assert!(metrics.contains("identity_resolve_total"));
        assert!(metrics.contains("identity_pow_duration_seconds"));
        assert!(metrics.contains("identity_errors_total"));
    }
}
