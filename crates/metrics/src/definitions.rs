//! Metric name and label definitions.
//!
//! Every metric name emitted by replywatch lives here so the `/metrics`
//! output stays discoverable from one place.

/// Scan (detect + digest) metrics
pub mod scan {
    /// Total number of scans started
    pub const RUNS_TOTAL: &str = "replywatch_scan_runs_total";
    /// Scans that ended in an error
    pub const ERRORS_TOTAL: &str = "replywatch_scan_errors_total";
    /// Alerts produced, summed over all scans
    pub const ALERTS_TOTAL: &str = "replywatch_scan_alerts_total";
    /// Alerts produced by the most recent scan
    pub const LAST_ALERTS: &str = "replywatch_scan_last_alerts";
    /// Owners examined after de-duplication
    pub const OWNERS_CHECKED_TOTAL: &str = "replywatch_scan_owners_checked_total";
    /// Duration of a scan in seconds
    pub const DURATION_SECONDS: &str = "replywatch_scan_duration_seconds";
}

/// Bitrix24 REST metrics
pub mod bitrix {
    /// REST method calls, labeled by method
    pub const CALLS_TOTAL: &str = "replywatch_bitrix_calls_total";
    /// Retries after a failed attempt
    pub const RETRIES_TOTAL: &str = "replywatch_bitrix_retries_total";
    /// Calls that failed after all retries
    pub const ERRORS_TOTAL: &str = "replywatch_bitrix_errors_total";
    /// Call-log sources that failed and fell through to the next one
    pub const CALL_SOURCE_FALLBACKS_TOTAL: &str = "replywatch_bitrix_call_source_fallbacks_total";
    /// Duration of a REST call in seconds (including retries)
    pub const CALL_DURATION_SECONDS: &str = "replywatch_bitrix_call_duration_seconds";
}

/// Telegram delivery metrics
pub mod telegram {
    /// Messages delivered
    pub const MESSAGES_SENT_TOTAL: &str = "replywatch_telegram_messages_sent_total";
    /// Messages that could not be delivered
    pub const SEND_ERRORS_TOTAL: &str = "replywatch_telegram_send_errors_total";
}

/// Scheduler metrics
pub mod cron {
    /// Scheduled runs that were skipped because a run was still active
    pub const SKIPPED_TOTAL: &str = "replywatch_cron_skipped_total";
    /// Scheduled runs executed
    pub const EXECUTIONS_TOTAL: &str = "replywatch_cron_executions_total";
}

/// HTTP API metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "replywatch_http_requests_total";
}

/// Common label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const SOURCE: &str = "source";
    pub const STATUS: &str = "status";
}

/// Histogram buckets
pub mod buckets {
    /// REST call duration buckets (in seconds), 50ms to 2 minutes
    pub const CALL_DURATION: &[f64] = &[
        0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 60.0, 120.0,
    ];

    /// Scan duration buckets (in seconds), 1s to 30 minutes
    pub const SCAN_DURATION: &[f64] = &[
        1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0,
    ];
}
