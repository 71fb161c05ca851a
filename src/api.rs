//! HTTP boundary: four POST scoring endpoints plus `/health`.
//!
//! Every scoring request carries `projectId` (required) and an optional `limit`,
//! and must present `Authorization: Bearer <token>`. Successful responses are
//! `{<field>: ScoreResult[], metadata, generatedAt}`; failures are
//! `{error, details?}`.
//!
//! Selectors are case-insensitive: `riskLevel` takes `low`, `medium` or `high`;
//! `tier` takes `at_risk` (also `at-risk`), `casual`, `active` or `superfan`.
//! `lookbackDays` must lie in `1..=MAX_WINDOW_DAYS`.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::config::{ScoringConfig, ServiceConfig, MAX_WINDOW_DAYS};
use crate::engine::{self, BatchOutcome, Metadata};
use crate::error::{ScoringError, SourceError, UnknownVariant};
use crate::metrics::{record_batch, record_request};
use crate::model::{EngagementTier, Level, ScoreResult, Tier};
use crate::random::{NoJitter, RandomSource, SeededRandom};
use crate::scoring::days_before;
use crate::source::DynSource;

#[derive(Clone)]
pub struct AppState {
    pub source: DynSource,
    pub scoring: Arc<ScoringConfig>,
    pub service: Arc<ServiceConfig>,
}

impl AppState {
    /// Service-level switches (simulate, prediction service) override the file config.
    /// The config is sanitized again so hand-built values obey the same bounds.
    pub fn new(source: DynSource, mut scoring: ScoringConfig, service: ServiceConfig) -> Self {
        scoring.sanitize();
        scoring.simulate |= service.simulate;
        scoring.prediction_service_connected |= service.prediction_service_connected();
        Self {
            source,
            scoring: Arc::new(scoring),
            service: Arc::new(service),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/churn-prediction", post(churn_prediction))
        .route("/tour-demand", post(tour_demand))
        .route("/recommendations", post(recommendations))
        .route("/fan-engagement", post(fan_engagement))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub use router as create_router;

// ---------- errors ----------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized(&'static str),
    #[error("Invalid request")]
    BadRequest(String),
    #[error("Not found")]
    NotFound(String),
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::Unauthorized(d) => Some((*d).to_string()),
            Self::BadRequest(d) | Self::NotFound(d) => Some(d.clone()),
            // Upstream messages can carry store URLs; they go to the log only.
            Self::Internal(_) => None,
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::NotFound { .. } => Self::NotFound(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ScoringError> for ApiError {
    fn from(e: ScoringError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(msg) = &self {
            error!(error = %msg, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ---------- request / response shapes ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChurnRequest {
    project_id: Option<String>,
    subject_ids: Option<Vec<String>>,
    lookback_days: Option<u32>,
    risk_level: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemandRequest {
    project_id: Option<String>,
    locations: Option<Vec<String>>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendRequest {
    project_id: Option<String>,
    subject_id: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngagementRequest {
    project_id: Option<String>,
    tier: Option<String>,
    limit: Option<usize>,
}

/// The result array, serialized under an endpoint-specific key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Results {
    Predictions(Vec<ScoreResult>),
    Forecasts(Vec<ScoreResult>),
    Recommendations(Vec<ScoreResult>),
    Fans(Vec<ScoreResult>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    #[serde(flatten)]
    pub results: Results,
    pub metadata: Metadata,
    pub generated_at: String,
}

impl ScoreResponse {
    fn new(results: Results, metadata: Metadata, now: DateTime<Utc>) -> Self {
        Self {
            results,
            metadata,
            generated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

// ---------- helpers ----------

/// Short, non-reversible tag for a credential so it can appear in logs.
fn anon(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn authorize(headers: &HeaderMap, service: &ServiceConfig) -> Result<(), ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, t)| t.trim())
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized("missing bearer token"))?;

    if service.api_tokens.iter().any(|t| t == token) {
        Ok(())
    } else {
        warn!(token = %anon(token), "rejected bearer token");
        Err(ApiError::Unauthorized("invalid bearer token"))
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

fn selector<T>(value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = UnknownVariant>,
{
    value
        .map(str::parse)
        .transpose()
        .map_err(|e: UnknownVariant| ApiError::BadRequest(e.to_string()))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

async fn ensure_project(state: &AppState, project_id: &str) -> Result<(), ApiError> {
    if state.source.project_exists(project_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("project `{project_id}` not found")))
    }
}

fn rng_for(cfg: &ScoringConfig, service: &ServiceConfig) -> Box<dyn RandomSource> {
    if cfg.simulate {
        Box::new(SeededRandom::new(service.seed))
    } else {
        Box::new(NoJitter)
    }
}

/// Metadata covers everything that survived the selectors; `limit` only trims the array.
fn finish(
    mut results: Vec<ScoreResult>,
    rejected: usize,
    limit: Option<usize>,
    cfg: &ScoringConfig,
) -> (Vec<ScoreResult>, Metadata) {
    let metadata = Metadata::summarize(&results, rejected, cfg);
    if let Some(n) = limit {
        results.truncate(n);
    }
    (results, metadata)
}

fn respond(endpoint: &'static str, result: Result<ScoreResponse, ApiError>) -> Response {
    match result {
        Ok(body) => {
            record_request(endpoint, StatusCode::OK.as_u16());
            Json(body).into_response()
        }
        Err(e) => {
            record_request(endpoint, e.status().as_u16());
            e.into_response()
        }
    }
}

// ---------- handlers ----------

async fn churn_prediction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond("churn-prediction", churn_inner(&state, &headers, &body).await)
}

async fn churn_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<ScoreResponse, ApiError> {
    authorize(headers, &state.service)?;
    let req: ChurnRequest = parse_body(body)?;
    let risk_level: Option<Level> = selector(req.risk_level.as_deref())?;
    let project_id = required(req.project_id.as_deref(), "projectId")?;
    ensure_project(state, project_id).await?;

    let mut cfg = (*state.scoring).clone();
    if let Some(days) = req.lookback_days {
        if !(1..=MAX_WINDOW_DAYS).contains(&days) {
            return Err(ApiError::BadRequest(format!(
                "lookbackDays must be between 1 and {MAX_WINDOW_DAYS}"
            )));
        }
        cfg.churn.lookback_days = days;
    }

    let now = Utc::now();
    let since = days_before(now, cfg.churn.lookback_days);
    let (mut subjects, events) = tokio::try_join!(
        state.source.subjects(project_id),
        state.source.events(project_id, since),
    )?;

    if let Some(ids) = &req.subject_ids {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        subjects.retain(|s| wanted.contains(s.id.as_str()));
        if let Some(missing) = ids.iter().find(|id| !subjects.iter().any(|s| &s.id == *id)) {
            return Err(ApiError::NotFound(format!("subject `{missing}` not found")));
        }
    }

    let started = Instant::now();
    let outcome = score_churn_batch(&subjects, &events, &cfg, &state.service, now);
    record_batch(
        "churn-prediction",
        outcome.results.len(),
        outcome.rejected.len(),
        started.elapsed(),
    );

    let mut results = outcome.results;
    if let Some(level) = risk_level {
        results.retain(|r| r.tier == Tier::Level(level));
    }
    let (results, metadata) = finish(results, outcome.rejected.len(), req.limit, &cfg);
    info!(
        project = project_id,
        scored = metadata.total_count,
        rejected = metadata.rejected_count,
        "churn prediction served"
    );
    Ok(ScoreResponse::new(Results::Predictions(results), metadata, now))
}

// Kept synchronous so the (non-Send) random source never lives across an await.
fn score_churn_batch(
    subjects: &[crate::model::Subject],
    events: &[crate::model::ActivityEvent],
    cfg: &ScoringConfig,
    service: &ServiceConfig,
    now: DateTime<Utc>,
) -> BatchOutcome {
    let mut rng = rng_for(cfg, service);
    engine::score_churn(subjects, events, cfg, now, rng.as_mut())
}

async fn tour_demand(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    respond("tour-demand", demand_inner(&state, &headers, &body).await)
}

async fn demand_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<ScoreResponse, ApiError> {
    authorize(headers, &state.service)?;
    let req: DemandRequest = parse_body(body)?;
    let project_id = required(req.project_id.as_deref(), "projectId")?;
    ensure_project(state, project_id).await?;

    let mut markets = state.source.markets(project_id).await?;
    if let Some(locs) = &req.locations {
        let wanted: Vec<String> = locs.iter().map(|l| l.trim().to_lowercase()).collect();
        markets.retain(|m| {
            wanted.iter().any(|w| {
                *w == m.item.id.to_lowercase() || *w == m.item.name.trim().to_lowercase()
            })
        });
    }

    let cfg = &*state.scoring;
    let now = Utc::now();
    let started = Instant::now();
    let outcome = engine::forecast_demand(&markets, cfg);
    record_batch(
        "tour-demand",
        outcome.results.len(),
        outcome.rejected.len(),
        started.elapsed(),
    );

    let rejected = outcome.rejected.len();
    let (results, metadata) = finish(outcome.results, rejected, req.limit, cfg);
    debug!(project = project_id, markets = metadata.total_count, "tour demand served");
    Ok(ScoreResponse::new(Results::Forecasts(results), metadata, now))
}

async fn recommendations(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond("recommendations", recommend_inner(&state, &headers, &body).await)
}

async fn recommend_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<ScoreResponse, ApiError> {
    authorize(headers, &state.service)?;
    let req: RecommendRequest = parse_body(body)?;
    let project_id = required(req.project_id.as_deref(), "projectId")?;
    let subject_id = required(req.subject_id.as_deref(), "subjectId")?;
    ensure_project(state, project_id).await?;

    let cfg = &*state.scoring;
    let now = Utc::now();
    let since = days_before(now, cfg.recommend.history_days);
    let (subjects, events, catalog) = tokio::try_join!(
        state.source.subjects(project_id),
        state.source.events(project_id, since),
        state.source.catalog(project_id),
    )?;

    let subject = subjects
        .iter()
        .find(|s| s.id == subject_id)
        .ok_or_else(|| ApiError::NotFound(format!("subject `{subject_id}` not found")))?;

    let started = Instant::now();
    // Rank the whole catalog so totalCount reflects every eligible item.
    let ranked = engine::recommend_for(subject, &events, &catalog, cfg, now, Some(catalog.len()))?;
    record_batch("recommendations", ranked.len(), 0, started.elapsed());

    let limit = req.limit.unwrap_or(cfg.recommend.limit);
    let (results, metadata) = finish(ranked, 0, Some(limit), cfg);
    debug!(
        project = project_id,
        subject = %anon(subject_id),
        returned = metadata.total_count,
        "recommendations served"
    );
    Ok(ScoreResponse::new(Results::Recommendations(results), metadata, now))
}

async fn fan_engagement(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond("fan-engagement", engagement_inner(&state, &headers, &body).await)
}

async fn engagement_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<ScoreResponse, ApiError> {
    authorize(headers, &state.service)?;
    let req: EngagementRequest = parse_body(body)?;
    let tier: Option<EngagementTier> = selector(req.tier.as_deref())?;
    let project_id = required(req.project_id.as_deref(), "projectId")?;
    ensure_project(state, project_id).await?;

    let cfg = &*state.scoring;
    let now = Utc::now();
    let since = days_before(now, cfg.engagement.window_days);
    let (subjects, events) = tokio::try_join!(
        state.source.subjects(project_id),
        state.source.events(project_id, since),
    )?;

    let started = Instant::now();
    let outcome = engine::classify_engagement(&subjects, &events, cfg, now);
    record_batch(
        "fan-engagement",
        outcome.results.len(),
        outcome.rejected.len(),
        started.elapsed(),
    );

    let mut results = outcome.results;
    if let Some(tier) = tier {
        results.retain(|r| r.tier == Tier::Engagement(tier));
    }
    let (results, metadata) = finish(results, outcome.rejected.len(), req.limit, cfg);
    debug!(project = project_id, fans = metadata.total_count, "fan engagement served");
    Ok(ScoreResponse::new(Results::Fans(results), metadata, now))
}
