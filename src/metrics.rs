// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_attempts_total", "Scan attempts dispatched.");
        describe_counter!("scan_failures_total", "Scan attempts that failed or timed out.");
        describe_histogram!("scan_duration_ms", "Wall time of one scan attempt in milliseconds.");
        describe_counter!(
            "items_extracted_total",
            "Items whose thread content was fetched."
        );
        describe_counter!("items_classified_total", "Items that reached `classified`.");
        describe_counter!(
            "classification_failures_total",
            "Items the classifier could not judge."
        );
        describe_counter!(
            "item_fetch_failures_total",
            "Thread fetches that failed or timed out."
        );
        describe_counter!("targets_removed_total", "Targets removed with their items.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        ensure_metrics_described();
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
