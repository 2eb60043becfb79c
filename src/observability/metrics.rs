//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): dispatched requests by method, status
//! - `bridge_request_duration_seconds` (histogram): dispatch latency by method
//! - `bridge_unhandled_errors_total` (counter): failures no exception handler took
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - The Prometheus exporter is optional and installed at most once

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

static EXPORTER: OnceLock<()> = OnceLock::new();

/// Record one finished dispatch.
pub fn record_dispatch(method: &str, status: u16, start: Instant) {
    counter!(
        "bridge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bridge_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a failure that fell through to the internal-error path.
pub fn record_unhandled() {
    counter!("bridge_unhandled_errors_total").increment(1);
}

/// Install the Prometheus exporter listening on `addr`.
///
/// Later calls are ignored. Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    EXPORTER.get_or_init(|| {
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
            Err(error) => {
                tracing::error!(
                    address = %addr,
                    error = %error,
                    "Failed to install metrics exporter"
                )
            }
        }
    });
}
