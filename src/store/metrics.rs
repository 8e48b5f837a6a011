//! Operation metrics for the store.

use std::time::Instant;

/// Records two metrics per store operation:
/// 1. `kv_operations_total` - counter by operation and status
/// 2. `kv_operation_duration_ms` - latency histogram
pub(crate) fn record_operation(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "kv_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "kv_operation_duration_ms",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation_does_not_panic() {
        // Without an installed recorder the macros are no-ops; this
        // verifies the label plumbing compiles and runs.
        let start = Instant::now();
        record_operation("get", start, "success");
        record_operation("set", start, "error");
    }
}
