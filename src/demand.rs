//! # Demand Forecaster
//!
//! Predicts demand for a location (tour stop) from aggregate market counts.
//!
//! - Six capped sub-factors are blended into a `market_score` in [0,1].
//! - With attendance history: `avg_attendance * (1 + market_score)`.
//! - Cold start: `max(fan_base*r1 + streaming/d + superfans*r2, floor)`.
//! - The result is scaled by the location's multiplier from config.
//! - Confidence starts at a base and accrues per evidence signal, capped.
//!
//! Multiplier lookup: alias → exact → fuzzy → default.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::{DemandConfig, MultiplierTable};
use crate::model::{Factor, MarketCandidate, MarketStats, ScoreResult};
use crate::scoring::{capped, clamp01, level_for, ratio, round2};

/// Normalized sub-factors, each in [0,1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketFactors {
    pub fan_base: f64,
    pub superfans: f64,
    pub engagement: f64,
    pub streaming: f64,
    pub recency: f64,
    pub utilization: f64,
}

impl MarketFactors {
    pub fn from_stats(s: &MarketStats, cfg: &DemandConfig) -> Self {
        let caps = &cfg.caps;
        Self {
            fan_base: capped(s.fan_base as f64, caps.fan_base),
            superfans: capped(s.superfans as f64, caps.superfans),
            engagement: capped(s.avg_engagement, caps.engagement),
            streaming: capped(s.streaming_volume as f64, caps.streaming),
            recency: capped(s.recent_activity as f64, caps.recent_activity),
            utilization: clamp01(s.capacity_utilization.unwrap_or(0.0)),
        }
    }

    /// `(name, normalized, weight)` in a fixed order.
    fn weighted(&self, cfg: &DemandConfig) -> [(&'static str, f64, f64); 6] {
        let w = &cfg.weights;
        [
            ("fan_base", self.fan_base, w.fan_base),
            ("superfans", self.superfans, w.superfans),
            ("engagement", self.engagement, w.engagement),
            ("streaming", self.streaming, w.streaming),
            ("recent_activity", self.recency, w.recency),
            ("capacity_utilization", self.utilization, w.utilization),
        ]
    }

    pub fn market_score(&self, cfg: &DemandConfig) -> f64 {
        clamp01(self.weighted(cfg).iter().map(|(_, v, w)| v * w).sum())
    }
}

/// Whether the forecast came from attendance history or the cold-start formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastBasis {
    Historical,
    ColdStart,
}

/// Unscaled demand before the location multiplier.
pub fn base_demand(s: &MarketStats, market_score: f64, cfg: &DemandConfig) -> (f64, ForecastBasis) {
    match s.historical_avg_attendance {
        Some(avg) if s.historical_concerts > 0 && avg.is_finite() && avg > 0.0 => {
            (avg * (1.0 + market_score), ForecastBasis::Historical)
        }
        _ => {
            let c = &cfg.cold_start;
            let raw = s.fan_base as f64 * c.fan_base_rate
                + ratio(s.streaming_volume as f64, c.streaming_divisor)
                + s.superfans as f64 * c.superfan_rate;
            (raw.max(c.floor), ForecastBasis::ColdStart)
        }
    }
}

/// Base plus a fixed increment for each evidence signal that clears its minimum, capped.
pub fn demand_confidence(s: &MarketStats, cfg: &DemandConfig) -> f64 {
    let c = &cfg.confidence;
    let mut conf = c.base;
    if s.fan_base >= c.fan_base_min {
        conf += c.fan_base_bonus;
    }
    if s.streaming_volume >= c.streaming_min {
        conf += c.streaming_bonus;
    }
    if s.historical_concerts >= c.concerts_min {
        conf += c.concerts_bonus;
    }
    if s.recent_activity >= c.recent_activity_min {
        conf += c.recent_activity_bonus;
    }
    conf.clamp(0.0, c.ceiling)
}

/// Forecast one location. The multiplier table comes from config, never from code.
pub fn forecast(candidate: &MarketCandidate, cfg: &DemandConfig) -> ScoreResult {
    let stats = &candidate.stats;
    let factors = MarketFactors::from_stats(stats, cfg);
    let market_score = factors.market_score(cfg);
    let (base, basis) = base_demand(stats, market_score, cfg);

    let location = if candidate.item.name.trim().is_empty() {
        candidate.item.id.as_str()
    } else {
        candidate.item.name.as_str()
    };
    let multiplier = cfg.multipliers.multiplier_for(location);
    let predicted = round2(base * multiplier);

    let reason = match basis {
        ForecastBasis::Historical => format!(
            "Based on {} past shows averaging {:.0} attendees, market multiplier {:.2}",
            stats.historical_concerts,
            stats.historical_avg_attendance.unwrap_or_default(),
            multiplier
        ),
        ForecastBasis::ColdStart => format!(
            "No attendance history; estimated from {} fans and {} streams, market multiplier {:.2}",
            stats.fan_base, stats.streaming_volume, multiplier
        ),
    };

    let mut result = ScoreResult::new(
        candidate.item.id.clone(),
        market_score,
        level_for(market_score, &cfg.levels),
        demand_confidence(stats, cfg),
    )
    .magnitude(predicted)
    .with_reason(reason);

    for (name, value, weight) in factors.weighted(cfg) {
        result = result.with_factor(Factor::new(name, value, value * weight));
    }
    result
}

impl MultiplierTable {
    /// Lookup order:
    /// 1. Alias (normalized) → canonical → multiplier.
    /// 2. Exact match.
    /// 3. Fuzzy match (Jaro-Winkler ≥ `fuzzy_min`) among keys with the same word
    ///    count, best score wins, ties by key. Off unless `fuzzy_min < 1.0`.
    /// 4. Default multiplier.
    pub fn multiplier_for(&self, location: &str) -> f64 {
        let s = normalize(location);
        if s.is_empty() {
            return self.default_multiplier;
        }

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&m) = self.locations.get(&normalize(canon)) {
                return m;
            }
        }

        if let Some(&m) = self.locations.get(&s) {
            return m;
        }

        if self.fuzzy_min < 1.0 {
            let words = s.split(' ').count();
            let best = self
                .locations
                .iter()
                .filter(|(k, _)| k.split(' ').count() == words)
                .map(|(k, &m)| (strsim::jaro_winkler(&s, k), k, m))
                .filter(|(sim, _, _)| *sim >= self.fuzzy_min)
                .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)));
            if let Some((_, _, m)) = best {
                return m;
            }
        }

        self.default_multiplier
    }

    /// Re-key `locations` and `aliases` (and alias targets) into the form
    /// [`multiplier_for`](Self::multiplier_for) looks up. On a collision the key
    /// that was already normalized wins, then the lexically smallest.
    pub fn normalize_keys(&mut self) {
        fn rekey<V>(map: &mut HashMap<String, V>) {
            let mut entries: Vec<(String, V)> = map.drain().collect();
            entries.sort_by_cached_key(|(k, _)| (normalize(k) != *k, k.clone()));
            for (k, v) in entries {
                map.entry(normalize(&k)).or_insert(v);
            }
        }

        rekey(&mut self.locations);
        rekey(&mut self.aliases);
        for target in self.aliases.values_mut() {
            *target = normalize(target);
        }
        self.locations.retain(|k, _| !k.is_empty());
        self.aliases.retain(|k, _| !k.is_empty());
    }
}

/// Lowercase, fold separators/punctuation to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    static RE_SEP: OnceCell<Regex> = OnceCell::new();
    let re = RE_SEP
        .get_or_init(|| Regex::new(r"[\p{Pd}_/\\.,'\s]+").expect("static separator regex"));
    re.replace_all(&s.to_lowercase(), " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateItem, Level, Tier};

    fn cfg() -> DemandConfig {
        DemandConfig::default()
    }

    fn market(id: &str, name: &str, stats: MarketStats) -> MarketCandidate {
        MarketCandidate {
            item: CandidateItem::new(id, "city", 2_000.0).named(name),
            stats,
        }
    }

    #[test]
    fn cold_start_uses_formula_above_floor() {
        let stats = MarketStats {
            fan_base: 20_000,
            streaming_volume: 500_000,
            superfans: 100,
            ..MarketStats::default()
        };
        let c = cfg();
        let ms = MarketFactors::from_stats(&stats, &c).market_score(&c);
        let (base, basis) = base_demand(&stats, ms, &c);
        assert_eq!(basis, ForecastBasis::ColdStart);
        assert!((base - (3_000.0 + 50_000.0 + 200.0)).abs() < 1e-9);
        assert!(base > c.cold_start.floor);

        // Unknown city → multiplier 1.0
        let r = forecast(&market("m1", "Springfield", stats), &c);
        assert_eq!(r.magnitude, Some(53_200.0));
    }

    #[test]
    fn cold_start_never_below_floor() {
        let c = cfg();
        let (base, _) = base_demand(&MarketStats::default(), 0.0, &c);
        assert_eq!(base, c.cold_start.floor);
    }

    #[test]
    fn historical_scales_by_market_score_and_multiplier() {
        let stats = MarketStats {
            fan_base: 10_000,
            superfans: 100,
            avg_engagement: 100.0,
            streaming_volume: 1_000_000,
            recent_activity: 1_000,
            historical_concerts: 3,
            historical_avg_attendance: Some(1_000.0),
            capacity_utilization: Some(1.0),
        };
        let c = cfg();
        let r = forecast(&market("m2", "NYC", stats), &c);
        assert!((r.score - 1.0).abs() < 1e-9);
        assert_eq!(r.tier, Tier::Level(Level::High));
        // 1000 * (1 + 1.0) * 1.5
        assert_eq!(r.magnitude, Some(3_000.0));
        assert!((r.confidence - 0.95).abs() < 1e-9);
        assert_eq!(r.factors.len(), 6);
    }

    #[test]
    fn confidence_accrues_per_signal() {
        let c = cfg();
        assert!((demand_confidence(&MarketStats::default(), &c) - 0.50).abs() < 1e-12);
        let s = MarketStats {
            fan_base: 5_000,
            ..MarketStats::default()
        };
        assert!((demand_confidence(&s, &c) - 0.65).abs() < 1e-12);
    }

    #[test]
    fn multiplier_lookup_order() {
        let t = MultiplierTable::default_seed();
        assert_eq!(t.multiplier_for("New York"), 1.5);
        assert_eq!(t.multiplier_for("nyc"), 1.5);
        assert_eq!(t.multiplier_for("  LOS-ANGELES "), 1.4);
        assert_eq!(t.multiplier_for("Chicagoo"), 1.0);
        assert_eq!(t.multiplier_for("Reykjavik"), 1.0);
        assert_eq!(t.multiplier_for(""), 1.0);
    }

    #[test]
    fn fuzzy_fallback_catches_typos_but_not_other_cities() {
        let mut t = MultiplierTable::default_seed();
        t.fuzzy_min = 0.92;
        assert_eq!(t.multiplier_for("Chicagoo"), 1.2);
        assert_eq!(t.multiplier_for("Los Angelez"), 1.4);
        assert_eq!(t.multiplier_for("Paris, TX"), 1.0);
        assert_eq!(t.multiplier_for("Berlin NH"), 1.0);
    }

    #[test]
    fn normalized_keys_match_display_names() {
        let mut t = MultiplierTable {
            locations: HashMap::from([
                ("New York".to_string(), 1.5),
                ("São-Paulo".to_string(), 1.2),
                ("  ".to_string(), 9.0),
            ]),
            aliases: HashMap::from([("NYC".to_string(), "New York".to_string())]),
            ..MultiplierTable::default()
        };
        assert_eq!(t.multiplier_for("New York"), 1.0);

        t.normalize_keys();
        assert_eq!(t.multiplier_for("New York"), 1.5);
        assert_eq!(t.multiplier_for("new-york"), 1.5);
        assert_eq!(t.multiplier_for("nyc"), 1.5);
        assert_eq!(t.multiplier_for("são paulo"), 1.2);
        assert_eq!(t.aliases.get("nyc").map(String::as_str), Some("new york"));
        assert!(!t.locations.contains_key(""));
    }

    #[test]
    fn normalize_keys_prefers_the_normalized_spelling() {
        let mut t = MultiplierTable {
            locations: HashMap::from([
                ("LONDON".to_string(), 2.0),
                ("london".to_string(), 1.4),
            ]),
            ..MultiplierTable::default()
        };
        t.normalize_keys();
        assert_eq!(t.locations.len(), 1);
        assert_eq!(t.multiplier_for("London"), 1.4);
    }

    #[test]
    fn zero_caps_do_not_divide_by_zero() {
        let mut c = cfg();
        c.caps.fan_base = 0.0;
        c.cold_start.streaming_divisor = 0.0;
        let stats = MarketStats {
            fan_base: 100,
            streaming_volume: 1_000,
            ..MarketStats::default()
        };
        let r = forecast(&market("m3", "x", stats), &c);
        assert!(r.score.is_finite() && r.magnitude.unwrap().is_finite());
    }
}
