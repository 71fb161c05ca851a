//! # Scoring Engine
//! Batch entry points over the per-item scorers. Pure: no I/O, no shared state.
//!
//! Every item is scored independently. A malformed item is rejected on its own
//! (collected in `BatchOutcome::rejected`) and never fails the batch. The
//! `*_stream` variants yield one result at a time so a caller can stop early
//! and keep what it has.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::model::{ActivityEvent, CandidateItem, MarketCandidate, ScoreResult, Subject};
use crate::random::RandomSource;
use crate::scoring::sort_results;
use crate::{churn, demand, engagement, recommend};

/// Events grouped by subject id, built once per batch.
#[derive(Debug, Default)]
pub struct EventIndex<'a> {
    by_subject: HashMap<&'a str, Vec<&'a ActivityEvent>>,
}

impl<'a> EventIndex<'a> {
    pub fn new(events: &'a [ActivityEvent]) -> Self {
        let mut by_subject: HashMap<&'a str, Vec<&'a ActivityEvent>> = HashMap::new();
        for e in events {
            by_subject.entry(e.subject_id.as_str()).or_default().push(e);
        }
        Self { by_subject }
    }

    pub fn for_subject(&self, id: &str) -> &[&'a ActivityEvent] {
        self.by_subject.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A batch item that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejected {
    pub index: usize,
    pub error: String,
}

impl From<ScoringError> for Rejected {
    fn from(e: ScoringError) -> Self {
        let index = match &e {
            ScoringError::MissingField { index, .. } => *index,
        };
        Self {
            index,
            error: e.to_string(),
        }
    }
}

/// Sorted results plus per-item rejections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<ScoreResult>,
    pub rejected: Vec<Rejected>,
}

impl BatchOutcome {
    /// Collect a stream of per-item results, then sort.
    pub fn collect<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<ScoreResult, ScoringError>>,
    {
        let mut out = Self::default();
        for item in items {
            match item {
                Ok(r) => out.results.push(r),
                Err(e) => out.rejected.push(e.into()),
            }
        }
        sort_results(&mut out.results);
        out
    }

    pub fn metadata(&self, cfg: &ScoringConfig) -> Metadata {
        Metadata::summarize(&self.results, self.rejected.len(), cfg)
    }
}

/// Summary attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub total_count: usize,
    pub counts_by_tier: BTreeMap<String, usize>,
    pub average_confidence: f64,
    pub prediction_service_connected: bool,
    pub rejected_count: usize,
}

impl Metadata {
    pub fn summarize(results: &[ScoreResult], rejected: usize, cfg: &ScoringConfig) -> Self {
        let mut counts_by_tier = BTreeMap::new();
        for r in results {
            *counts_by_tier.entry(r.tier.to_string()).or_insert(0) += 1;
        }
        let average_confidence = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64
        };
        Self {
            total_count: results.len(),
            counts_by_tier,
            average_confidence,
            prediction_service_connected: cfg.prediction_service_connected,
            rejected_count: rejected,
        }
    }
}

fn validate_subject(index: usize, s: &Subject) -> Result<(), ScoringError> {
    if s.id.trim().is_empty() {
        return Err(ScoringError::MissingField {
            entity: "subject",
            field: "id",
            index,
        });
    }
    Ok(())
}

fn validate_candidate(index: usize, c: &CandidateItem) -> Result<(), ScoringError> {
    if c.id.trim().is_empty() {
        return Err(ScoringError::MissingField {
            entity: "candidate",
            field: "id",
            index,
        });
    }
    Ok(())
}

/// Churn results one subject at a time, in input order.
pub fn churn_stream<'a>(
    subjects: &'a [Subject],
    events: &'a EventIndex<'a>,
    cfg: &'a ScoringConfig,
    now: DateTime<Utc>,
    rng: &'a mut dyn RandomSource,
) -> impl Iterator<Item = Result<ScoreResult, ScoringError>> + 'a {
    subjects
        .iter()
        .enumerate()
        .map(move |(i, s)| -> Result<ScoreResult, ScoringError> {
            validate_subject(i, s)?;
            Ok(churn::score_subject(
                s,
                events.for_subject(&s.id),
                cfg,
                now,
                &mut *rng,
            ))
        })
}

/// Score churn for a batch. `rng` is only drawn from when `cfg.simulate` is set.
pub fn score_churn(
    subjects: &[Subject],
    events: &[ActivityEvent],
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> BatchOutcome {
    let index = EventIndex::new(events);
    let out = BatchOutcome::collect(churn_stream(subjects, &index, cfg, now, rng));
    debug!(
        scored = out.results.len(),
        rejected = out.rejected.len(),
        "churn batch scored"
    );
    out
}

/// Engagement results one subject at a time, in input order.
pub fn engagement_stream<'a>(
    subjects: &'a [Subject],
    events: &'a EventIndex<'a>,
    cfg: &'a ScoringConfig,
    now: DateTime<Utc>,
) -> impl Iterator<Item = Result<ScoreResult, ScoringError>> + 'a {
    subjects
        .iter()
        .enumerate()
        .map(move |(i, s)| -> Result<ScoreResult, ScoringError> {
            validate_subject(i, s)?;
            Ok(engagement::score_subject(
                s,
                events.for_subject(&s.id),
                &cfg.engagement,
                now,
            ))
        })
}

pub fn classify_engagement(
    subjects: &[Subject],
    events: &[ActivityEvent],
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
) -> BatchOutcome {
    let index = EventIndex::new(events);
    let out = BatchOutcome::collect(engagement_stream(subjects, &index, cfg, now));
    debug!(
        scored = out.results.len(),
        rejected = out.rejected.len(),
        "engagement batch scored"
    );
    out
}

/// Forecasts sorted by predicted demand descending.
pub fn forecast_demand(markets: &[MarketCandidate], cfg: &ScoringConfig) -> BatchOutcome {
    let forecasts = markets
        .iter()
        .enumerate()
        .map(|(i, m)| -> Result<ScoreResult, ScoringError> {
            validate_candidate(i, &m.item)?;
            Ok(demand::forecast(m, &cfg.demand))
        });
    let out = BatchOutcome::collect(forecasts);
    debug!(
        scored = out.results.len(),
        rejected = out.rejected.len(),
        "demand batch forecast"
    );
    out
}

/// Top-N recommendations for one subject. Empty catalog is `Ok(vec![])`.
pub fn recommend_for(
    subject: &Subject,
    events: &[ActivityEvent],
    catalog: &[CandidateItem],
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<ScoreResult>, ScoringError> {
    validate_subject(0, subject)?;
    let history = events
        .iter()
        .filter(|e| e.subject_id == subject.id)
        .collect::<Vec<_>>();
    Ok(recommend::recommend(
        subject,
        &history,
        catalog,
        &cfg.recommend,
        now,
        limit,
    ))
}
