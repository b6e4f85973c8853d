//! News bundle service binary entrypoint.
//! Boots the Axum HTTP server: config, tracing, metrics, orchestrator, routes.

use news_bundle::api::{self, AppState};
use news_bundle::config::AppConfig;
use news_bundle::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON when NEWS_BUNDLE_LOG_JSON=1.
/// Shuttle may already have installed a subscriber; that one wins.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_bundle=info,bundle=info,warn"));

    let json = std::env::var("NEWS_BUNDLE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = AppConfig::load_default()?;
    let metrics = Metrics::init()?;
    let orchestrator = cfg.build_orchestrator()?;

    tracing::info!(
        feeds = cfg.feeds.len(),
        store = if cfg.store.dir.is_some() { "json_file" } else { "memory" },
        "news bundle service starting"
    );

    let router = api::router(AppState::new(orchestrator)).merge(metrics.router());

    Ok(router.into())
}
