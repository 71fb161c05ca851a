//! # Churn / Risk Scorer
//! Weighted-factor churn probability for one subject over a lookback window.
//!
//! Factors (each normalized before weighting):
//!   - recency:   `min(days_since_last / lookback, 1) * recency_weight`
//!   - frequency: `max(frequency_base - count * frequency_step, 0)` (already scaled)
//!   - value:     bucket on average transaction value (low / mid / high)
//!
//! The sum is clamped to [0,1] and mapped to a risk level with strict `>` thresholds.
//! Jitter is added only when `ScoringConfig::simulate` is set.

use chrono::{DateTime, Utc};

use crate::config::{ChurnConfig, ScoringConfig};
use crate::model::{ActivityEvent, Factor, Level, ScoreResult, Subject};
use crate::random::RandomSource;
use crate::scoring::{clamp01, days_before, days_between, evidence_confidence, level_for, ratio};

/// Intermediate factor values, exposed for explainability and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnFactors {
    pub activity_count: usize,
    pub days_since_last: Option<f64>,
    pub average_value: f64,
    pub recency: f64,
    pub frequency: f64,
    pub value: f64,
}

impl ChurnFactors {
    pub fn sum(&self) -> f64 {
        self.recency + self.frequency + self.value
    }
}

/// Compute the three factors. `events` may contain other subjects' rows or rows
/// outside the window; both are ignored.
pub fn churn_factors(
    subject: &Subject,
    events: &[&ActivityEvent],
    cfg: &ChurnConfig,
    now: DateTime<Utc>,
) -> ChurnFactors {
    let lookback_days = cfg.lookback_days.max(1);
    let window_start = days_before(now, lookback_days);

    let in_window = events
        .iter()
        .filter(|e| e.subject_id == subject.id && e.timestamp >= window_start)
        .collect::<Vec<_>>();

    let activity_count = in_window.len();
    let last = in_window.iter().map(|e| e.timestamp).max();
    let days_since_last = last.map(|ts| days_between(ts, now));

    // 1) Recency: no activity in the window saturates at 1.
    let recency_norm = match days_since_last {
        Some(d) => clamp01(ratio(d, f64::from(lookback_days))),
        None => 1.0,
    };
    let recency = recency_norm * cfg.recency_weight;

    // 2) Frequency: already on the probability scale.
    let frequency = (cfg.frequency_base - activity_count as f64 * cfg.frequency_step).max(0.0);

    // 3) Value bucket.
    let average_value = average_value(subject, &in_window, cfg);
    let value = if average_value < cfg.low_value_below {
        cfg.low_value_risk
    } else if average_value > cfg.high_value_above {
        cfg.high_value_risk
    } else {
        cfg.mid_value_risk
    };

    ChurnFactors {
        activity_count,
        days_since_last,
        average_value,
        recency,
        frequency,
        value,
    }
}

/// Window purchase mean → lifetime value / lifetime orders → configured default.
fn average_value(subject: &Subject, in_window: &[&&ActivityEvent], cfg: &ChurnConfig) -> f64 {
    let amounts = in_window
        .iter()
        .filter(|e| e.kind.is_purchase())
        .filter_map(|e| e.amount)
        .filter(|a| a.is_finite())
        .collect::<Vec<_>>();
    if !amounts.is_empty() {
        return amounts.iter().sum::<f64>() / amounts.len() as f64;
    }

    match (subject.lifetime_value, subject.lifetime_orders) {
        (Some(ltv), Some(orders)) if orders > 0 && ltv.is_finite() => ltv / f64::from(orders),
        _ => cfg.default_average_value,
    }
}

/// Score one subject. Assumes `subject.id` was validated by the caller.
pub fn score_subject(
    subject: &Subject,
    events: &[&ActivityEvent],
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
    rng: &mut dyn RandomSource,
) -> ScoreResult {
    let c = &cfg.churn;
    let f = churn_factors(subject, events, c, now);

    let mut raw = f.sum();
    if cfg.simulate {
        raw += rng.symmetric(c.jitter);
    }
    let probability = clamp01(raw);
    let level = level_for(probability, &c.levels);
    let confidence = evidence_confidence(f.activity_count, &c.confidence);

    let action = match level {
        Level::High => &c.actions.high,
        Level::Medium => &c.actions.medium,
        Level::Low => &c.actions.low,
    };

    let recency_norm = if c.recency_weight > 0.0 {
        ratio(f.recency, c.recency_weight)
    } else {
        f.days_since_last.map_or(1.0, |d| ratio(d, f64::from(c.lookback_days)))
    };

    ScoreResult::new(subject.id.clone(), probability, level, confidence)
        .with_factor(Factor::new("recency", recency_norm, f.recency))
        .with_factor(Factor::new(
            "frequency",
            ratio(f.frequency, c.frequency_base),
            f.frequency,
        ))
        .with_factor(Factor::new(
            "value",
            ratio(f.value, c.low_value_risk.max(c.mid_value_risk)),
            f.value,
        ))
        .with_reason(describe(&f, c.lookback_days))
        .with_action(action.clone())
}

fn describe(f: &ChurnFactors, lookback_days: u32) -> String {
    match f.days_since_last {
        None => format!("No activity in the last {lookback_days} days"),
        Some(d) => format!(
            "{} interactions in {lookback_days} days, last {:.0} days ago, average value {:.2}",
            f.activity_count, d, f.average_value
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, Tier};
    use crate::random::{NoJitter, SeededRandom};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn order(subject: &str, days_ago: i64, amount: f64) -> ActivityEvent {
        ActivityEvent::new(subject, EventKind::Order, now() - Duration::days(days_ago))
            .amount(amount)
    }

    fn refs(v: &[ActivityEvent]) -> Vec<&ActivityEvent> {
        v.iter().collect()
    }

    #[test]
    fn no_activity_is_high_risk() {
        let cfg = ScoringConfig::default();
        let s = Subject::new("c1");
        let r = score_subject(&s, &[], &cfg, now(), &mut NoJitter);
        assert!(r.score >= 0.5, "got {}", r.score);
        assert_eq!(r.tier, Tier::Level(Level::High));
        // recency 0.40 + frequency 0.30 + default value (100 → mid) 0.10
        assert!((r.score - 0.80).abs() < 1e-9);
    }

    #[test]
    fn frequent_high_value_buyer_is_low_risk() {
        let cfg = ScoringConfig::default();
        let s = Subject::new("c2");
        let evs = (0..10)
            .map(|i| order("c2", if i == 0 { 1 } else { 2 + i }, 300.0))
            .collect::<Vec<_>>();
        let r = score_subject(&s, &refs(&evs), &cfg, now(), &mut NoJitter);
        assert!(r.score < 0.2, "got {}", r.score);
        assert_eq!(r.tier, Tier::Level(Level::Low));
        assert!(r.confidence <= cfg.churn.confidence.ceiling);
    }

    #[test]
    fn events_outside_window_or_for_others_are_ignored() {
        let cfg = ScoringConfig::default();
        let s = Subject::new("c3");
        let evs = vec![order("c3", 45, 500.0), order("other", 1, 500.0)];
        let f = churn_factors(&s, &refs(&evs), &cfg.churn, now());
        assert_eq!(f.activity_count, 0);
        assert_eq!(f.recency, cfg.churn.recency_weight);
        assert!((f.frequency - 0.30).abs() < 1e-12);
    }

    #[test]
    fn value_falls_back_to_lifetime_then_default() {
        let cfg = ScoringConfig::default();

        let cheap = Subject::new("c4").lifetime(120.0, 4); // avg 30 → low bucket
        let f = churn_factors(&cheap, &[], &cfg.churn, now());
        assert!((f.average_value - 30.0).abs() < 1e-12);
        assert!((f.value - 0.20).abs() < 1e-12);

        let zero_orders = Subject::new("c5").lifetime(900.0, 0);
        let f = churn_factors(&zero_orders, &[], &cfg.churn, now());
        assert_eq!(f.average_value, cfg.churn.default_average_value);
    }

    #[test]
    fn production_mode_never_draws_randomness() {
        struct Counting(usize);
        impl RandomSource for Counting {
            fn next_unit(&mut self) -> f64 {
                self.0 += 1;
                0.99
            }
        }
        let cfg = ScoringConfig::default();
        let mut rng = Counting(0);
        let _ = score_subject(&Subject::new("c6"), &[], &cfg, now(), &mut rng);
        assert_eq!(rng.0, 0);
    }

    #[test]
    fn simulate_jitter_stays_in_bounds() {
        let mut cfg = ScoringConfig::default();
        cfg.simulate = true;
        let mut rng = SeededRandom::new(3);
        let s = Subject::new("c7");
        for _ in 0..100 {
            let r = score_subject(&s, &[], &cfg, now(), &mut rng);
            assert!((0.0..=1.0).contains(&r.score));
            assert!((r.score - 0.80).abs() <= 0.10 + 1e-9);
        }
    }

    #[test]
    fn attaches_action_for_level() {
        let cfg = ScoringConfig::default();
        let r = score_subject(&Subject::new("c8"), &[], &cfg, now(), &mut NoJitter);
        assert_eq!(r.suggested_action.as_deref(), Some(cfg.churn.actions.high.as_str()));
        assert_eq!(r.factors.len(), 3);
    }
}
