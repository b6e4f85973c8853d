use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once from the entrypoint.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
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

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("bundle_requests_total", "Bundle resolutions requested.");
        describe_counter!(
            "bundle_cache_hits_total",
            "Bundles found in the store, labelled by staleness."
        );
        describe_counter!("bundle_cache_misses_total", "Bundles not found in the store.");
        describe_counter!(
            "bundle_refresh_total",
            "Fetch-and-merge cycles, labelled sync/background."
        );
        describe_counter!("provider_errors_total", "Provider fetch/parse errors.");
        describe_counter!("provider_timeouts_total", "Provider fetch attempts that timed out.");
        describe_counter!(
            "provider_rate_limited_total",
            "Provider fetches skipped by the rate limiter."
        );
        describe_counter!("provider_stories_total", "Candidates parsed from feeds.");
        describe_counter!("merge_input_total", "Candidates fed into the merge.");
        describe_counter!("merge_duplicates_total", "Candidates folded into another story.");
        describe_histogram!("merge_ms", "Merge time in milliseconds.");
        describe_histogram!("provider_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("bundle_last_fetch_ts", "Unix ts of the last successful fetch.");
    });
}
