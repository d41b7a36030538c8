//! Shared metrics recording for store backends.

use crate::Result;
use std::time::Instant;

/// Records operation metrics for store operations.
///
/// Emits `storage_operations_total` (counter by status) and
/// `storage_operation_duration_ms` (histogram).
///
/// # Arguments
///
/// * `backend` - Backend name (e.g., "memory", "sqlite")
/// * `operation` - Operation name (e.g., "has", "write_batch", "scan_range")
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - Operation status ("success" or "error")
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Records metrics for a finished operation, deriving status from the result.
pub fn record_result<T>(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    result: &Result<T>,
) {
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
}
