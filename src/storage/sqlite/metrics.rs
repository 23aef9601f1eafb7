//! Metrics recording for the `SQLite` store.

use std::time::Instant;

/// Backend label attached to every storage metric.
pub const BACKEND: &str = "sqlite";

/// Records operation metrics for a storage operation.
///
/// Two series per call:
/// 1. `storage_operations_total` - counter by operation and status
/// 2. `storage_operation_duration_ms` - latency histogram
///
/// `status` is `"success"` or `"error"`.
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => BACKEND,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => BACKEND,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result to its metric status label.
pub const fn status_of<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}
