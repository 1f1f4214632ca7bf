//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatehouse_requests_total` (counter): responses by method, status
//! - `gatehouse_request_duration_seconds` (histogram): latency distribution
//! - `gatehouse_rate_limited_total` (counter): requests rejected by the limiter
//! - `gatehouse_rate_limiter_clients` (gauge): tracked clients after a sweep
//! - `gatehouse_auth_failures_total` (counter): gate/authenticator rejections by reason
//! - `gatehouse_edit_conflicts_total` (counter): refused stale updates
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

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

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gatehouse_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gatehouse_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("gatehouse_rate_limited_total").increment(1);
}

pub fn record_tracked_clients(count: usize) {
    gauge!("gatehouse_rate_limiter_clients").set(count as f64);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("gatehouse_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_edit_conflict() {
    counter!("gatehouse_edit_conflicts_total").increment(1);
}
