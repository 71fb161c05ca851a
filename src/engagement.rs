//! # Engagement Tier Classifier
//!
//! Engagement score (0–100) for a fan over a window:
//!
//! ```text
//! streams/stream_cap * stream_points
//!   + tickets/ticket_cap * ticket_points
//!   + merch/merch_cap * merch_points        (each ratio capped at 1)
//!   + recency bonus (full within recency_full_days, linear to 0 at window end)
//! ```
//!
//! Tier decision table. Rules are evaluated top to bottom; the first match wins.
//! Do not reorder: rule 2's compound condition must not pre-empt rule 1.
//!
//! | # | Condition                                                     | Tier     |
//! |---|---------------------------------------------------------------|----------|
//! | 1 | superfan flag OR score > superfan_above                       | superfan |
//! | 2 | score > active_above OR (streams ≥ high_volume AND tickets ≥ 1) | active |
//! | 3 | score > casual_above OR streams ≥ moderate                    | casual   |
//! | 4 | otherwise                                                     | at_risk  |

use chrono::{DateTime, Utc};

use crate::config::EngagementConfig;
use crate::model::{ActivityEvent, EngagementTier, EventKind, Factor, ScoreResult, Subject};
use crate::scoring::{capped, clamp01, days_before, days_between, evidence_confidence, ratio};

/// Raw counts and the blended score fed into the decision table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementSignals {
    pub superfan: bool,
    pub streams: u32,
    pub tickets: u32,
    pub merch: u32,
    pub days_since_last: Option<f64>,
    /// 0–100.
    pub score: f64,
}

type Rule = fn(&EngagementSignals, &EngagementConfig) -> bool;

/// Ordered, first-match-wins. Anything unmatched is `AtRisk`.
const DECISION_TABLE: [(EngagementTier, Rule); 3] = [
    (EngagementTier::Superfan, |s: &EngagementSignals, c: &EngagementConfig| {
        s.superfan || s.score > c.superfan_above
    }),
    (EngagementTier::Active, |s: &EngagementSignals, c: &EngagementConfig| {
        s.score > c.active_above || (s.streams >= c.high_volume_streams && s.tickets >= 1)
    }),
    (EngagementTier::Casual, |s: &EngagementSignals, c: &EngagementConfig| {
        s.score > c.casual_above || s.streams >= c.moderate_streams
    }),
];

pub fn classify(signals: &EngagementSignals, cfg: &EngagementConfig) -> EngagementTier {
    DECISION_TABLE
        .iter()
        .find(|(_, rule)| rule(signals, cfg))
        .map(|(tier, _)| *tier)
        .unwrap_or(EngagementTier::AtRisk)
}

/// Count activity in the window and blend it into a 0–100 score.
pub fn signals_for(
    subject: &Subject,
    events: &[&ActivityEvent],
    cfg: &EngagementConfig,
    now: DateTime<Utc>,
) -> EngagementSignals {
    let window_days = cfg.window_days.max(1);
    let start = days_before(now, window_days);

    let (mut streams, mut tickets, mut merch) = (0u32, 0u32, 0u32);
    let mut last: Option<DateTime<Utc>> = None;
    for e in events
        .iter()
        .filter(|e| e.subject_id == subject.id && e.timestamp >= start)
    {
        let n = e.quantity.unwrap_or(1).max(1);
        match e.kind {
            EventKind::Stream => streams = streams.saturating_add(n),
            EventKind::Ticket => tickets = tickets.saturating_add(n),
            EventKind::Merch => merch = merch.saturating_add(n),
            EventKind::Order | EventKind::View => {}
        }
        last = last.max(Some(e.timestamp));
    }

    let days_since_last = last.map(|ts| days_between(ts, now));
    let recency = recency_fraction(days_since_last, cfg);

    let score = capped(f64::from(streams), cfg.stream_cap) * cfg.stream_points
        + capped(f64::from(tickets), cfg.ticket_cap) * cfg.ticket_points
        + capped(f64::from(merch), cfg.merch_cap) * cfg.merch_points
        + recency * cfg.recency_points;

    EngagementSignals {
        superfan: subject.superfan,
        streams,
        tickets,
        merch,
        days_since_last,
        score: score.clamp(0.0, 100.0),
    }
}

/// 1.0 within `recency_full_days`, then linear down to 0.0 at the window edge.
fn recency_fraction(days_since_last: Option<f64>, cfg: &EngagementConfig) -> f64 {
    let Some(d) = days_since_last else {
        return 0.0;
    };
    let full = f64::from(cfg.recency_full_days);
    let window = f64::from(cfg.window_days.max(1));
    if d <= full {
        1.0
    } else {
        clamp01(1.0 - ratio(d - full, window - full))
    }
}

/// Score and classify one fan. `score` on the result is the 0–100 score scaled to [0,1].
pub fn score_subject(
    subject: &Subject,
    events: &[&ActivityEvent],
    cfg: &EngagementConfig,
    now: DateTime<Utc>,
) -> ScoreResult {
    let s = signals_for(subject, events, cfg, now);
    let tier = classify(&s, cfg);
    let evidence = s.streams.saturating_add(s.tickets).saturating_add(s.merch) as usize;

    let reason = if subject.superfan {
        "Flagged as superfan".to_string()
    } else {
        format!(
            "{} streams, {} tickets, {} merch purchases in {} days",
            s.streams, s.tickets, s.merch, cfg.window_days
        )
    };

    let stream_n = capped(f64::from(s.streams), cfg.stream_cap);
    let ticket_n = capped(f64::from(s.tickets), cfg.ticket_cap);
    let merch_n = capped(f64::from(s.merch), cfg.merch_cap);
    let recency_n = recency_fraction(s.days_since_last, cfg);

    ScoreResult::new(
        subject.id.clone(),
        s.score / 100.0,
        tier,
        evidence_confidence(evidence, &cfg.confidence),
    )
    .with_factor(Factor::new("streaming", stream_n, stream_n * cfg.stream_points))
    .with_factor(Factor::new("tickets", ticket_n, ticket_n * cfg.ticket_points))
    .with_factor(Factor::new("merch", merch_n, merch_n * cfg.merch_points))
    .with_factor(Factor::new("recency", recency_n, recency_n * cfg.recency_points))
    .with_reason(reason)
}
