//! Metrics for the Vitrina server
//!
//! Two surfaces: a Prometheus exporter at /metrics, and the in-process
//! ingestion counters operators read through the API. The counters are
//! process-lifetime and diagnostic only; they reset on restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use axum::{http::StatusCode, response::IntoResponse};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use vitrina_core::types::IngestionMetrics;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system
pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("Failed to install metrics recorder");

    METRICS_HANDLE.set(handle).ok();

    tracing::info!("Metrics system initialized");
}

/// Handler for /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS_HANDLE.get() {
        Some(handle) => {
            let metrics = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                metrics,
            )
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Record the outcome of one event ingestion attempt
pub fn record_event_outcome(outcome: &'static str) {
    counter!("vitrina_events_ingested_total", "outcome" => outcome).increment(1);
}

/// Record the outcome of one request submission attempt
pub fn record_request_outcome(outcome: &'static str) {
    counter!("vitrina_requests_submitted_total", "outcome" => outcome).increment(1);
}

/// Record one lifecycle transition by target status
pub fn record_status_transition(target: &'static str) {
    counter!("vitrina_request_transitions_total", "target" => target).increment(1);
}

/// Process-lifetime tallies for the public event ingestion path.
#[derive(Debug, Default)]
pub struct IngestionCounters {
    total: AtomicU64,
    ingested: AtomicU64,
    duplicated: AtomicU64,
    rate_limited: AtomicU64,
    unauthorized: AtomicU64,
}

impl IngestionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicated(&self) {
        self.duplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestionMetrics {
        IngestionMetrics {
            total: self.total.load(Ordering::Relaxed),
            ingested: self.ingested.load(Ordering::Relaxed),
            duplicated: self.duplicated.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_tally_independently() {
        let counters = IngestionCounters::new();
        counters.record_total();
        counters.record_total();
        counters.record_ingested();
        counters.record_duplicated();
        counters.record_unauthorized();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.ingested, 1);
        assert_eq!(snapshot.duplicated, 1);
        assert_eq!(snapshot.rate_limited, 0);
        assert_eq!(snapshot.unauthorized, 1);
    }
}
