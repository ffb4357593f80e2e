//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, path kind
//! - `proxy_request_duration_seconds` (histogram): passthrough latency
//! - `proxy_backend_dial_failures_total` (counter): failed WebSocket dials by status
//! - `proxy_websocket_sessions_active` (gauge): relaying sessions
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished HTTP request.
pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    let status = status.to_string();
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status,
        "kind" => kind
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
}

/// Record a backend WebSocket dial failure.
pub fn record_dial_failure(status: u16) {
    counter!("proxy_backend_dial_failures_total", "status" => status.to_string()).increment(1);
}

pub fn session_opened() {
    gauge!("proxy_websocket_sessions_active").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_websocket_sessions_active").decrement(1.0);
}
