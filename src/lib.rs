// src/lib.rs
// Public library surface: pure scorers, the engine, data sources and the HTTP router.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod random;
pub mod scoring;
pub mod source;

// Per-domain scorers
pub mod churn;
pub mod demand;
pub mod engagement;
pub mod recommend;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::{ScoringConfig, ServiceConfig};
pub use crate::engine::{
    classify_engagement, forecast_demand, recommend_for, score_churn, BatchOutcome, Metadata,
};
pub use crate::error::{ScoringError, SourceError, UnknownVariant};
pub use crate::model::{
    ActivityEvent, CandidateItem, EngagementTier, EventKind, Level, MarketCandidate, MarketStats,
    ScoreResult, Subject, Tier,
};
pub use crate::random::{NoJitter, RandomSource, SeededRandom};
pub use crate::source::{DataSource, DynSource};

use axum::Router;
use tracing::info;

/// Full app from explicit parts: scoring routes plus `/metrics`.
pub fn build_app(
    source: DynSource,
    scoring: ScoringConfig,
    service: ServiceConfig,
) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;
    info!(
        source = source.name(),
        simulate = scoring.simulate || service.simulate,
        prediction_service = service.prediction_service_connected(),
        "scoring app assembled"
    );
    let state = AppState::new(source, scoring, service);
    Ok(router(state).merge(metrics.router()))
}

/// Build the app the way the binary does: config file + environment.
pub async fn app() -> anyhow::Result<Router> {
    let scoring = ScoringConfig::load_default()?;
    let service = ServiceConfig::from_env();
    let source = source::build_source(&service)?;
    build_app(source, scoring, service)
}
