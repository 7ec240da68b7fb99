//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): completed relays by mode, status
//! - `relay_request_duration_seconds` (histogram): time to response headers by mode
//! - `relay_errors_total` (counter): failed relays by error kind
//! - `relay_invalid_targets_total` (counter): rejected target URLs
//! - `relay_open_upstream_streams` (gauge): streamed upstream bodies not yet released
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are low-cardinality (no target URLs)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_relay(mode: &'static str, status: u16, start: Instant) {
    counter!("relay_requests_total", "mode" => mode, "status" => status.to_string()).increment(1);
    histogram!("relay_request_duration_seconds", "mode" => mode).record(start.elapsed().as_secs_f64());
}

pub fn record_relay_error(kind: &'static str) {
    counter!("relay_errors_total", "kind" => kind).increment(1);
}

pub fn record_invalid_target() {
    counter!("relay_invalid_targets_total").increment(1);
}

pub fn stream_opened() {
    gauge!("relay_open_upstream_streams").increment(1.0);
}

pub fn stream_released() {
    gauge!("relay_open_upstream_streams").decrement(1.0);
}
