//! Metrics collection and exposition.
//!
//! # Metrics
//! - `api_requests_rate_limited_total` (counter): admissions denied
//! - `api_requests_rejected_draining_total` (counter): requests refused during drain
//! - `api_edit_conflicts_total` (counter): conditional writes that lost the race
//! - `api_handler_faults_total` (counter): panics contained at the request boundary
//! - `api_background_tasks` (gauge): outstanding tracked tasks
//! - `api_limiter_clients` (gauge): clients held by the limiter registry
//! - `api_limiter_evictions_total` (counter): clients removed by the sweep
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests call these freely.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_rate_limited() {
    counter!("api_requests_rate_limited_total").increment(1);
}

pub fn record_rejected_draining() {
    counter!("api_requests_rejected_draining_total").increment(1);
}

pub fn record_edit_conflict(reason: &'static str) {
    counter!("api_edit_conflicts_total", "reason" => reason).increment(1);
}

pub fn record_handler_fault() {
    counter!("api_handler_faults_total").increment(1);
}

pub fn record_background_tasks(outstanding: usize) {
    gauge!("api_background_tasks").set(outstanding as f64);
}

pub fn record_limiter_clients(clients: usize) {
    gauge!("api_limiter_clients").set(clients as f64);
}

pub fn record_limiter_evictions(evicted: usize) {
    counter!("api_limiter_evictions_total").increment(evicted as u64);
}
