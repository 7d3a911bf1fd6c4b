//! Metrics collection and exposition.
//!
//! # Metrics
//! - `custody_jobs_submitted_total` (counter): admitted jobs by type
//! - `custody_jobs_rejected_total` (counter): jobs refused at admission by type
//! - `custody_jobs_finished_total` (counter): finished jobs by type, state
//! - `custody_job_duration_seconds` (histogram): time from start to write-back
//! - `custody_jobs_outstanding` (gauge): admitted jobs not yet finished
//! - `custody_seal_polls_total` (counter): transaction status polls
//! - `custody_transactions_total` (counter): transactions by outcome
//! - `custody_chain_health` (gauge): 1=reachable, 0=unreachable
//!
//! Recording is a no-op until a recorder is installed.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Serving metrics");
    Ok(())
}

pub fn record_job_submitted(job_type: &'static str) {
    counter!("custody_jobs_submitted_total", "type" => job_type).increment(1);
}

pub fn record_job_rejected(job_type: &'static str) {
    counter!("custody_jobs_rejected_total", "type" => job_type).increment(1);
}

pub fn record_job_finished(job_type: &'static str, state: &'static str, started: Instant) {
    counter!("custody_jobs_finished_total", "type" => job_type, "state" => state).increment(1);
    histogram!("custody_job_duration_seconds", "type" => job_type).record(started.elapsed().as_secs_f64());
}

pub fn set_jobs_outstanding(count: usize) {
    gauge!("custody_jobs_outstanding").set(count as f64);
}

pub fn record_seal_poll() {
    counter!("custody_seal_polls_total").increment(1);
}

pub fn record_transaction(outcome: &'static str) {
    counter!("custody_transactions_total", "outcome" => outcome).increment(1);
}

pub fn record_chain_health(healthy: bool) {
    gauge!("custody_chain_health").set(if healthy { 1.0 } else { 0.0 });
}
