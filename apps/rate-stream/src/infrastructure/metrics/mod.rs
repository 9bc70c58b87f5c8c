//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: broadcast loop progress and fetch failures
//! - **Deliveries**: messages sent and per-subscriber send failures
//! - **Subscribers**: active WebSocket subscriber count
//! - **Latency**: fetch and delivery durations
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the service port.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
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
    describe_counter!(
        "rate_stream_ticks_total",
        "Broadcast ticks completed since startup"
    );
    describe_counter!(
        "rate_stream_fetch_failures_total",
        "Failed upstream fetch attempts (including retries)"
    );
    describe_counter!(
        "rate_stream_degraded_updates_total",
        "Ticks that produced a degraded (null-rate) update"
    );
    describe_counter!(
        "rate_stream_messages_sent_total",
        "Updates successfully delivered to subscribers"
    );
    describe_counter!(
        "rate_stream_send_failures_total",
        "Per-subscriber deliveries that failed or timed out"
    );
    describe_gauge!(
        "rate_stream_subscribers_active",
        "Currently connected WebSocket subscribers"
    );
    describe_histogram!(
        "rate_stream_fetch_duration_seconds",
        "Time spent obtaining an update (including retries)"
    );
    describe_histogram!(
        "rate_stream_delivery_duration_seconds",
        "Time spent fanning one update out to all subscribers"
    );
}
