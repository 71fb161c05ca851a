//! Prometheus exposition for the scoring endpoints.
//!
//! Series:
//!   - `scoring_requests_total{endpoint,status}`
//!   - `scoring_results_total{endpoint}`
//!   - `scoring_rejected_total{endpoint}`
//!   - `scoring_duration_ms{endpoint}` (histogram, engine time only)

use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

// The recorder is process-global; building a second router must reuse it.
static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (first call only) and describe our series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| -> anyhow::Result<PrometheusHandle> {
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")?;
                describe();
                Ok(handle)
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "scoring_requests_total",
        "Scoring requests by endpoint and response status."
    );
    describe_counter!("scoring_results_total", "Scored items returned.");
    describe_counter!(
        "scoring_rejected_total",
        "Batch items rejected by input validation."
    );
    describe_histogram!("scoring_duration_ms", "Engine time per batch in milliseconds.");
}

pub fn record_request(endpoint: &'static str, status: u16) {
    counter!("scoring_requests_total", "endpoint" => endpoint, "status" => status.to_string())
        .increment(1);
}

pub fn record_batch(endpoint: &'static str, scored: usize, rejected: usize, elapsed: Duration) {
    counter!("scoring_results_total", "endpoint" => endpoint).increment(scored as u64);
    if rejected > 0 {
        counter!("scoring_rejected_total", "endpoint" => endpoint).increment(rejected as u64);
    }
    histogram!("scoring_duration_ms", "endpoint" => endpoint).record(elapsed.as_secs_f64() * 1000.0);
}
