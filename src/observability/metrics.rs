//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relay operations by mode, status
//! - `relay_request_duration_seconds` (histogram): time until the response head
//! - `relay_stream_bytes_total` (counter): body bytes streamed to clients
//! - `relay_stream_outcomes_total` (counter): how streams ended
//! - `relay_upstream_errors_total` (counter): terminal errors by kind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exporter is optional and off by default

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::relay::{RelayError, StreamSummary};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a relay operation whose response head has been produced.
pub fn record_request(mode: &'static str, status: u16, start: Instant) {
    counter!("relay_requests_total", "mode" => mode, "status" => status.to_string()).increment(1);
    histogram!("relay_request_duration_seconds", "mode" => mode).record(start.elapsed().as_secs_f64());
}

/// Record the end of a streamed body.
pub fn record_stream(mode: &'static str, summary: &StreamSummary) {
    counter!("relay_stream_bytes_total", "mode" => mode).increment(summary.bytes);
    counter!("relay_stream_outcomes_total", "mode" => mode, "outcome" => summary.outcome.as_str())
        .increment(1);
}

/// Record a relay operation that ended in an error response.
pub fn record_error(error: &RelayError) {
    counter!("relay_upstream_errors_total", "kind" => error.kind()).increment(1);
}
