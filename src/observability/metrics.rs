//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, action
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_decisions_total` (counter): verdicts by action and cause
//! - `gateway_signature_matches_total` (counter): attack matches by signature
//! - `gateway_counter_store_errors_total` (counter): failed-open store calls
//! - `gateway_audit_events_total` (counter): audit pipeline outcomes
//! - `gateway_policy_reloads_total` (counter): applied/rejected reloads
//! - `gateway_origin_errors_total` (counter): upstream failures

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, action: &'static str, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "action" => action
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "action" => action)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_decision(action: &'static str, cause: &'static str) {
    ::metrics::counter!("gateway_decisions_total", "action" => action, "cause" => cause)
        .increment(1);
}

pub fn record_signature_match(signature: &str) {
    ::metrics::counter!("gateway_signature_matches_total", "signature" => signature.to_string())
        .increment(1);
}

pub fn record_store_error(backend: &'static str) {
    ::metrics::counter!("gateway_counter_store_errors_total", "backend" => backend).increment(1);
}

pub fn record_audit_event(outcome: &'static str) {
    ::metrics::counter!("gateway_audit_events_total", "outcome" => outcome).increment(1);
}

pub fn record_policy_reload(outcome: &'static str) {
    ::metrics::counter!("gateway_policy_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_origin_error(kind: &'static str) {
    ::metrics::counter!("gateway_origin_errors_total", "kind" => kind).increment(1);
}
