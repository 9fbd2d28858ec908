// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the notifier's counters.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!(
            "scheduler_cycles_total",
            "Pipeline cycles per source by outcome (changed, unchanged, failed)"
        );
        describe_counter!(
            "deliveries_total",
            "Deliveries per platform by outcome"
        );
        describe_counter!(
            "media_artwork_failures_total",
            "Artwork images that could not be downloaded"
        );
        describe_counter!(
            "reconcile_changed_total",
            "Reconciliations that reported a changed deal list"
        );

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
