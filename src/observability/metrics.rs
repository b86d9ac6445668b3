//! Metrics collection and exposition.
//!
//! # Metrics
//! - `apigate_requests_total` (counter): proxied requests by method, status, route
//! - `apigate_request_duration_seconds` (histogram): end-to-end latency
//! - `apigate_expr_failures_total` (counter): failed evaluations by kind
//! - `apigate_reloads_total` (counter): reload attempts by outcome
//! - `apigate_reload_duration_seconds` (histogram)
//! - `apigate_snapshot_generation` (gauge), `apigate_routes` / `apigate_upstreams` (gauges)
//! - `apigate_usage_total` (counter): metered usage by route and unit
//!
//! # Design Decisions
//! - Exporter runs its own listener, separate from proxy and admin
//! - Labels stay low-cardinality: route ids, never paths

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("apigate_requests_total", &labels).increment(1);
    histogram!("apigate_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// `kind` is one of `transform`, `metering`, `path_rewrite`.
pub fn record_expr_failure(kind: &'static str) {
    counter!("apigate_expr_failures_total", "kind" => kind).increment(1);
}

/// `outcome` is one of `published`, `skipped`, `failed`, `timeout`.
pub fn record_reload(outcome: &'static str, duration: Duration) {
    counter!("apigate_reloads_total", "outcome" => outcome).increment(1);
    histogram!("apigate_reload_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

pub fn record_snapshot(generation: u64, routes: usize, upstreams: usize) {
    gauge!("apigate_snapshot_generation").set(generation as f64);
    gauge!("apigate_routes").set(routes as f64);
    gauge!("apigate_upstreams").set(upstreams as f64);
}

pub fn record_usage(route: &str, unit: &str, value: f64) {
    counter!(
        "apigate_usage_total",
        "route" => route.to_string(),
        "unit" => unit.to_string()
    )
    .increment(value.round() as u64);
}
