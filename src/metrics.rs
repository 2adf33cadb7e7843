use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        describe_counter!(
            "nlp_crisis_overrides_total",
            "Plans replaced by the fixed crisis response"
        );
        describe_counter!(
            "nlp_theme_fallback_total",
            "Theme recomputes that fell back to the other clustering method"
        );
        describe_counter!(
            "nlp_rewrite_outcome_total",
            "Enhanced-language rewrites by outcome"
        );
        describe_counter!(
            "nlp_signal_fallback_total",
            "Signal calls answered by the fallback backend"
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
