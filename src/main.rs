//! Audience Scoring Service: binary entrypoint
//! Boots the Axum HTTP server via Shuttle: config, data source, routes.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use audience_scoring::config::{ScoringConfig, ServiceConfig};
use audience_scoring::source::build_source;

/// Tracing is opt-in: `SCORING_DEV_LOG=1`. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let enabled = std::env::var("SCORING_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");
    if !enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("audience_scoring=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // try_init: Shuttle may have installed a subscriber already.
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
    if let Err(e) = res {
        eprintln!("tracing already initialized: {e}");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let scoring = ScoringConfig::load_default()?;
    let service = ServiceConfig::from_env();
    if service.api_tokens.is_empty() {
        tracing::warn!("SCORING_API_TOKENS is empty; every scoring request will get 401");
    }
    let source = build_source(&service).map_err(shuttle_runtime::CustomError::new)?;

    let router = audience_scoring::build_app(source, scoring, service)?;
    Ok(router.into())
}
