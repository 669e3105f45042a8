//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_calls_total` (counter): completed calls by side, method, code
//! - `rpc_call_duration_seconds` (histogram): call latency by side, method
//! - `rpc_deadline_exceeded_total` (counter): expiries by observing layer
//! - `rpc_active_connections` (gauge): live server connections

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Which end of the call recorded a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
        }
    }
}

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

/// Record one finished call.
pub fn record_call(side: Side, method: &str, code: &'static str, start: Instant) {
    metrics::counter!(
        "rpc_calls_total",
        "side" => side.as_str(),
        "method" => method.to_string(),
        "code" => code
    )
    .increment(1);
    metrics::histogram!(
        "rpc_call_duration_seconds",
        "side" => side.as_str(),
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a deadline expiry observed by `layer` (client, server, interceptor).
pub fn record_deadline_exceeded(layer: &'static str) {
    metrics::counter!("rpc_deadline_exceeded_total", "layer" => layer).increment(1);
}

/// Update the live connection gauge.
pub fn record_active_connections(count: u64) {
    metrics::gauge!("rpc_active_connections").set(count as f64);
}
