//! Prometheus Metrics Module
//!
//! Counters and gauges for the push channel and the update dispatcher,
//! rendered at `/metrics` on the status server.
//!
//! # Metrics Categories
//!
//! - **Events**: pushed events received, by name
//! - **Handlers**: handler invocations that returned an error
//! - **Connection**: current state, reconnect attempts, transport errors
//! - **Dispatcher**: activation cycles and bootstrap fetch failures
//! - **Cache**: writes per store cell
//! - **Fetches**: backend request latency by resource

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::events::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Handle for rendering metrics, if [`init_metrics`] has run.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "qx_sync_events_received_total",
        "Pushed Socket.IO events received, by event name"
    );
    describe_counter!(
        "qx_sync_handler_failures_total",
        "Event handler invocations that returned an error"
    );

    describe_gauge!(
        "qx_sync_connection_state",
        "1 for the push channel's current state, 0 for the others"
    );
    describe_counter!(
        "qx_sync_reconnects_total",
        "Push channel reconnection attempts"
    );
    describe_counter!(
        "qx_sync_connection_errors_total",
        "Push channel transport errors by type"
    );

    describe_counter!(
        "qx_sync_activations_total",
        "Dispatcher activation cycles started"
    );
    describe_counter!(
        "qx_sync_bootstrap_failures_total",
        "Eager overview fetches that failed on activation"
    );

    describe_counter!(
        "qx_sync_cache_writes_total",
        "Writes to the shared store, by cell"
    );

    describe_histogram!(
        "qx_sync_fetch_seconds",
        "Backend snapshot fetch latency by resource"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const STATES: [ConnectionState; 4] = [
    ConnectionState::Disconnected,
    ConnectionState::Connecting,
    ConnectionState::Connected,
    ConnectionState::Reconnecting,
];

/// Backend resource labels for fetch metrics.
#[derive(Debug, Clone, Copy)]
pub enum Resource {
    /// `getTrades` on the QX API.
    Trades,
    /// `qtreatz/overview` on the backend API.
    QTreatzOverview,
}

impl Resource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::QTreatzOverview => "qtreatz_overview",
        }
    }
}

/// Record a pushed event.
pub fn record_event_received(event: &str) {
    counter!(
        "qx_sync_events_received_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Record a handler that returned an error.
pub fn record_handler_failure(event: &str) {
    counter!(
        "qx_sync_handler_failures_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Publish the current connection state as a one-hot gauge.
pub fn set_connection_state(current: ConnectionState) {
    for state in STATES {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("qx_sync_connection_state", "state" => state.as_str()).set(value);
    }
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("qx_sync_reconnects_total").increment(1);
}

/// Record a transport error.
pub fn record_connection_error(error_type: &'static str) {
    counter!(
        "qx_sync_connection_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a dispatcher activation.
pub fn record_activation() {
    counter!("qx_sync_activations_total").increment(1);
}

/// Record a failed bootstrap fetch.
pub fn record_bootstrap_failure() {
    counter!("qx_sync_bootstrap_failures_total").increment(1);
}

/// Record a write observed on a store cell.
pub fn record_cache_write(cell: &'static str, writes: u64) {
    counter!("qx_sync_cache_writes_total", "cell" => cell).increment(writes);
}

/// Record how long a backend fetch took.
pub fn record_fetch_duration(resource: Resource, duration: Duration) {
    histogram!(
        "qx_sync_fetch_seconds",
        "resource" => resource.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
