//! Metrics emitted while ingesting transfer logs.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

/// Label carrying the reason an entry was skipped.
pub const REASON_LABEL: &str = "reason";

/// Label carrying the outcome of a window, `succeeded` or `failed`.
pub const STATUS_LABEL: &str = "status";

pub const XFER_ENTRIES_SCANNED_TOTAL: &str = "xfer_entries_scanned_total";

pub const XFER_ENTRIES_SKIPPED_TOTAL: &str = "xfer_entries_skipped_total";

pub const XFER_RECORDS_WRITTEN_TOTAL: &str = "xfer_records_written_total";

pub const XFER_RECORDS_FAILED_TOTAL: &str = "xfer_records_failed_total";

pub const XFER_BULK_RETRIES_TOTAL: &str = "xfer_bulk_retries_total";

pub const XFER_BULK_FLUSH_DURATION_SECONDS: &str = "xfer_bulk_flush_duration_seconds";

pub const XFER_WINDOWS_COMPLETED_TOTAL: &str = "xfer_windows_completed_total";

/// Registers the descriptions of all metrics. Calling it more than once is harmless.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            XFER_ENTRIES_SCANNED_TOTAL,
            Unit::Count,
            "Raw log entries read from the source"
        );

        describe_counter!(
            XFER_ENTRIES_SKIPPED_TOTAL,
            Unit::Count,
            "Raw log entries that produced no record, labeled by reason"
        );

        describe_counter!(
            XFER_RECORDS_WRITTEN_TOTAL,
            Unit::Count,
            "Records upserted into day partitions"
        );

        describe_counter!(
            XFER_RECORDS_FAILED_TOTAL,
            Unit::Count,
            "Records the store rejected or that still failed after the last retry"
        );

        describe_counter!(
            XFER_BULK_RETRIES_TOTAL,
            Unit::Count,
            "Bulk requests sent again after a failure"
        );

        describe_histogram!(
            XFER_BULK_FLUSH_DURATION_SECONDS,
            Unit::Seconds,
            "Time spent flushing one batch, retries included"
        );

        describe_counter!(
            XFER_WINDOWS_COMPLETED_TOTAL,
            Unit::Count,
            "Windows processed, labeled by outcome"
        );
    });
}
