// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analysis;
pub mod api;
pub mod companion;
pub mod config;
pub mod evidence;
pub mod metrics;
pub mod models;
pub mod prompts;
pub mod rewrite;
pub mod safety;
pub mod signals;
pub mod text;
pub mod themes;
pub mod weekly;

// ---- Re-exports for stable public API ----
pub use crate::analysis::analyze_entry;
pub use crate::api::{create_router, router, AppState};
pub use crate::companion::{chat_turn, compose_plan, render_plan};
pub use crate::config::NlpConfig;
pub use crate::evidence::{merge_entries, select_evidence, select_theme_evidence, snippet};
pub use crate::prompts::{compose_prompts, weekly_prompts};
pub use crate::safety::detect_crisis;
pub use crate::themes::{choose_cluster_method, cluster_themes, ClusterMethod, ThemeError};
pub use crate::weekly::compose_weekly;

use axum::Router;
use tracing::{info, warn};

/// Full application router: config from disk + env, shared backends, and
/// `/metrics` when a Prometheus recorder could be installed.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = NlpConfig::load()?;
    let state = AppState::from_config(&cfg)?;
    let mut router = create_router(state, &cfg.server.cors_origins);

    match crate::metrics::Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = %e, "metrics recorder not installed, /metrics disabled"),
    }

    info!(
        cors_origins = cfg.server.cors_origins.len(),
        rewrite = cfg.rewrite.enabled,
        "dearme-nlp router ready"
    );
    Ok(router)
}
