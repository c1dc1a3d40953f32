//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_queries_total` (counter): queries by outcome
//! - `bridge_query_duration_seconds` (histogram): query latency by outcome
//! - `bridge_connection_events_total` (counter): attached/superseded/lost/closed
//! - `bridge_unmatched_replies_total` (counter): replies matching no token
//! - `bridge_pending_requests` (gauge): queries waiting for a reply
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished query.
pub fn record_query(outcome: &'static str, started: Instant) {
    counter!("bridge_queries_total", "outcome" => outcome).increment(1);
    histogram!("bridge_query_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_connection_event(event: &'static str) {
    counter!("bridge_connection_events_total", "event" => event).increment(1);
}

pub fn record_unmatched_reply() {
    counter!("bridge_unmatched_replies_total").increment(1);
}

pub fn set_pending(count: usize) {
    gauge!("bridge_pending_requests").set(count as f64);
}
