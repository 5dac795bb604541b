//! Agent self-metrics.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use ::metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all agent metrics with descriptions.
///
/// This ensures metrics appear in the exporter output with proper metadata.
pub fn register_core_metrics() {
    // Collection metrics
    describe_histogram!(
        "hostmon_collection_duration_seconds",
        "Time taken by one collection cycle, including the CPU window"
    );
    describe_counter!("hostmon_collections_total", "Total number of successful collections");
    describe_counter!(
        "hostmon_collection_failures_total",
        "Total number of aborted collections (by probe)"
    );
    describe_counter!(
        "hostmon_counter_resets_total",
        "Interface counters observed going backwards (by interface)"
    );

    // Persistence metrics
    describe_counter!(
        "hostmon_snapshots_dropped_total",
        "Snapshots evicted from a full persistence queue"
    );
    describe_counter!(
        "hostmon_storage_failures_total",
        "Storage failures (by backend, operation)"
    );
    describe_counter!(
        "hostmon_retention_deleted_rows_total",
        "Rows removed by retention cleanup (by backend)"
    );

    // API metrics
    describe_counter!("hostmon_api_requests_total", "Total number of API requests (by endpoint, status)");
}

pub fn record_collection(duration_secs: f64) {
    histogram!("hostmon_collection_duration_seconds").record(duration_secs);
    counter!("hostmon_collections_total").increment(1);
}

pub fn record_collection_failure(probe: &'static str) {
    counter!("hostmon_collection_failures_total", "probe" => probe).increment(1);
}

pub fn record_counter_reset(interface: &str) {
    counter!("hostmon_counter_resets_total", "interface" => interface.to_string()).increment(1);
}

pub fn record_snapshot_dropped() {
    counter!("hostmon_snapshots_dropped_total").increment(1);
}

pub fn record_storage_failure(backend: &'static str, operation: &'static str) {
    counter!("hostmon_storage_failures_total", "backend" => backend, "operation" => operation)
        .increment(1);
}

pub fn record_cleanup(backend: &'static str, deleted: u64) {
    counter!("hostmon_retention_deleted_rows_total", "backend" => backend).increment(deleted);
}

pub fn record_api_request(endpoint: &'static str, status: u16) {
    counter!(
        "hostmon_api_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
}
