//! Prometheus Metrics Module
//!
//! Exposes stream metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Processed and skipped ticks per symbol
//! - **Scoring**: Anomalies, scorer failures and scoring latency
//! - **Persistence**: Anomaly store failures by operation
//! - **Fan-out**: Messages delivered, listeners pruned, live listeners
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Tick counters
    describe_counter!(
        "anomaly_stream_ticks_processed_total",
        "Ticks appended to a rolling window"
    );
    describe_counter!(
        "anomaly_stream_rows_skipped_total",
        "Ticks skipped because they were short or malformed"
    );

    // Scoring
    describe_counter!(
        "anomaly_stream_anomalies_total",
        "Windows scored above the anomaly threshold"
    );
    describe_counter!(
        "anomaly_stream_scoring_errors_total",
        "Scorer invocations that failed"
    );
    describe_histogram!(
        "anomaly_stream_scoring_seconds",
        "Time spent scoring one window"
    );

    // Persistence
    describe_counter!(
        "anomaly_stream_persistence_errors_total",
        "Anomaly store operations that failed"
    );

    // Fan-out
    describe_counter!(
        "anomaly_stream_messages_sent_total",
        "Messages delivered to listeners"
    );
    describe_counter!(
        "anomaly_stream_listeners_pruned_total",
        "Listeners removed after a failed delivery"
    );
    describe_gauge!("anomaly_stream_listeners", "Registered listeners");
    describe_gauge!("anomaly_stream_active_streams", "Running streams");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for anomaly store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    /// Appending an anomaly.
    Save,
    /// Querying recent anomalies.
    FetchRecent,
    /// Clearing a symbol's anomalies.
    Truncate,
}

impl StoreOperation {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::FetchRecent => "fetch_recent",
            Self::Truncate => "truncate",
        }
    }
}

/// Record a tick appended to the window of `symbol`.
pub fn record_tick_processed(symbol: &str) {
    counter!(
        "anomaly_stream_ticks_processed_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a skipped tick.
pub fn record_row_skipped(symbol: &str) {
    counter!(
        "anomaly_stream_rows_skipped_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a flagged anomaly.
pub fn record_anomaly(symbol: &str) {
    counter!(
        "anomaly_stream_anomalies_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a scorer failure.
pub fn record_scoring_error(symbol: &str) {
    counter!(
        "anomaly_stream_scoring_errors_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record scoring duration.
pub fn record_scoring_duration(duration: Duration) {
    histogram!("anomaly_stream_scoring_seconds").record(duration.as_secs_f64());
}

/// Record a failed anomaly store operation.
pub fn record_persistence_error(operation: StoreOperation) {
    counter!(
        "anomaly_stream_persistence_errors_total",
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Record messages delivered by one broadcast.
pub fn record_messages_sent(count: usize) {
    if count > 0 {
        counter!("anomaly_stream_messages_sent_total").increment(count as u64);
    }
}

/// Record listeners pruned by one broadcast.
pub fn record_listeners_pruned(count: usize) {
    if count > 0 {
        counter!("anomaly_stream_listeners_pruned_total").increment(count as u64);
    }
}

/// Update the registered listener count.
#[allow(clippy::cast_precision_loss)]
pub fn set_listeners(count: usize) {
    gauge!("anomaly_stream_listeners").set(count as f64);
}

/// Update the running stream count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_streams(count: usize) {
    gauge!("anomaly_stream_active_streams").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_operation_as_str() {
        assert_eq!(StoreOperation::Save.as_str(), "save");
        assert_eq!(StoreOperation::FetchRecent.as_str(), "fetch_recent");
        assert_eq!(StoreOperation::Truncate.as_str(), "truncate");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_tick_processed("AAPL");
        record_messages_sent(0);
        record_scoring_duration(Duration::from_millis(3));
        set_active_streams(2);
    }
}
