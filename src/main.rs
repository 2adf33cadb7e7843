//! DearMe NLP service: binary entrypoint.
//! Boots the Axum HTTP server on the Shuttle runtime.
//!
//! See `README.md` for the routes and `config/nlp.toml` for the knobs.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs filtered by `RUST_LOG` (default `dearme_nlp=info,warn`).
/// `try_init` so a subscriber installed by the runtime wins.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dearme_nlp=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let router = dearme_nlp::app().await?;
    Ok(router.into())
}
