//! Shared numeric helpers for every scorer.
//!
//! All scorers funnel their arithmetic through these so the domain guarantees
//! (clamped scores, guarded denominators, saturating confidence, stable
//! ordering) hold in one place.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use crate::config::{ConfidenceConfig, LevelThresholds};
use crate::model::{Level, ScoreResult};

const SECS_PER_DAY: f64 = 86_400.0;

/// Clamp to [0.0, 1.0]. NaN and -0.0 map to 0.0.
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() || x <= 0.0 {
        0.0
    } else {
        x.min(1.0)
    }
}

/// Division with a guarded denominator: returns 0.0 when `den` is zero, negative or not finite.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den.is_finite() && den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// `value / cap`, capped at 1.0.
pub fn capped(value: f64, cap: f64) -> f64 {
    clamp01(ratio(value, cap))
}

/// Whole and fractional days from `from` to `now`; never negative.
pub fn days_between(from: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - from).num_seconds() as f64 / SECS_PER_DAY).max(0.0)
}

/// Start of a window reaching `days` back from `now`. Saturates at the earliest
/// representable instant instead of overflowing.
pub fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Confidence from a count of supporting events: `base + step * n`, saturating at the ceiling.
pub fn evidence_confidence(evidence: usize, cfg: &ConfidenceConfig) -> f64 {
    let raw = cfg.base + cfg.per_event * evidence as f64;
    raw.clamp(0.0, cfg.ceiling)
}

/// Strict-greater step function: `> high` → High, `> medium` → Medium, else Low.
pub fn level_for(score: f64, t: &LevelThresholds) -> Level {
    if score > t.high {
        Level::High
    } else if score > t.medium {
        Level::Medium
    } else {
        Level::Low
    }
}

/// Primary value descending, then id ascending.
pub fn by_rank(a: &ScoreResult, b: &ScoreResult) -> Ordering {
    b.primary()
        .total_cmp(&a.primary())
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort in place by [`by_rank`].
pub fn sort_results(results: &mut [ScoreResult]) {
    results.sort_by(by_rank);
}

/// Round to two decimals for presentation values (forecast magnitudes, money).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;

    #[test]
    fn ratio_guards_zero_and_nan_denominators() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(5.0, -1.0), 0.0);
        assert_eq!(ratio(5.0, f64::NAN), 0.0);
        assert_eq!(ratio(6.0, 3.0), 2.0);
    }

    #[test]
    fn days_before_saturates_on_huge_windows() {
        let now = Utc::now();
        assert_eq!(days_before(now, 30), now - Duration::days(30));
        assert_eq!(days_before(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(days_before(DateTime::<Utc>::MIN_UTC, 1), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn confidence_is_monotonic_and_saturates() {
        let cfg = ConfidenceConfig {
            base: 0.30,
            per_event: 0.05,
            ceiling: 0.95,
        };
        let mut prev = 0.0;
        for n in 0..100 {
            let c = evidence_confidence(n, &cfg);
            assert!(c >= prev);
            assert!(c <= 0.95);
            prev = c;
        }
        assert!((evidence_confidence(1_000, &cfg) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn level_thresholds_are_strict() {
        let t = LevelThresholds {
            high: 0.70,
            medium: 0.40,
        };
        assert_eq!(level_for(0.70, &t), Level::Medium);
        assert_eq!(level_for(0.7001, &t), Level::High);
        assert_eq!(level_for(0.40, &t), Level::Low);
        assert_eq!(level_for(0.41, &t), Level::Medium);
    }

    #[test]
    fn sort_breaks_ties_by_id() {
        let mut v = vec![
            ScoreResult::new("b", 0.5, Level::Medium, 0.5),
            ScoreResult::new("a", 0.5, Level::Medium, 0.5),
            ScoreResult::new("c", 0.9, Level::High, 0.5),
        ];
        sort_results(&mut v);
        let ids: Vec<_> = v.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}
