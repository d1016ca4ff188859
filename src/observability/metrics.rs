//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, validated
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_validation_failures_total` (counter): failed checks by direction
//! - `gateway_pipeline_outcomes_total` (counter): validated requests by terminal state
//! - `gateway_pending_cycles` (gauge): open request/response cycles
//! - `gateway_forced_closes_total` (counter): closes forced by the deadline
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::validation::pipeline::PipelineOutcome;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, validated: bool, start: Instant) {
    let validated = if validated { "true" } else { "false" };
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "validated" => validated
    )
    .increment(1);
    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "validated" => validated
    )
    .record(start.elapsed().as_secs_f64());
}

/// `direction` is `"in"` or `"out"`.
pub fn record_validation_failure(direction: &'static str) {
    ::metrics::counter!("gateway_validation_failures_total", "direction" => direction).increment(1);
}

pub fn record_pipeline(outcome: PipelineOutcome) {
    ::metrics::counter!("gateway_pipeline_outcomes_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn cycle_started() {
    ::metrics::gauge!("gateway_pending_cycles").increment(1.0);
}

pub fn cycle_ended() {
    ::metrics::gauge!("gateway_pending_cycles").decrement(1.0);
}

pub fn record_forced_close() {
    ::metrics::counter!("gateway_forced_closes_total").increment(1);
}
