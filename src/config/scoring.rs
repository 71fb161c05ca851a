// src/config/scoring.rs
//! Every weight, threshold and multiplier the scorers use.
//!
//! Loaded from TOML or JSON; any missing section or field falls back to the
//! defaults below. `sanitize()` runs after every load so the scorers can rely
//! on finite, non-negative weights and ordered thresholds.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SCORING_CONFIG_PATH: &str = "SCORING_CONFIG_PATH";
pub const DEFAULT_SCORING_CONFIG_PATH: &str = "config/scoring.toml";
/// Upper bound for every day window, in config and in request overrides.
pub const MAX_WINDOW_DAYS: u32 = 3650;
const FALLBACK_JSON_PATH: &str = "config/scoring.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Demo/test data generation: enables churn jitter. Production keeps this off.
    pub simulate: bool,
    /// Whether an external prediction service is wired in (reported in metadata only).
    pub prediction_service_connected: bool,
    pub churn: ChurnConfig,
    pub demand: DemandConfig,
    pub recommend: RecommendConfig,
    pub engagement: EngagementConfig,
}

/// `> high` → High, `> medium` → Medium, else Low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub high: f64,
    pub medium: f64,
}

/// `min(base + per_event * evidence, ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    pub base: f64,
    pub per_event: f64,
    pub ceiling: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base: 0.30,
            per_event: 0.05,
            ceiling: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    pub lookback_days: u32,
    pub recency_weight: f64,
    pub frequency_base: f64,
    pub frequency_step: f64,
    pub low_value_below: f64,
    pub high_value_above: f64,
    pub low_value_risk: f64,
    pub mid_value_risk: f64,
    pub high_value_risk: f64,
    /// Average transaction value assumed when neither events nor lifetime data have one.
    pub default_average_value: f64,
    /// Symmetric jitter amplitude applied in simulate mode only.
    pub jitter: f64,
    pub levels: LevelThresholds,
    pub confidence: ConfidenceConfig,
    pub actions: ChurnActions,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            recency_weight: 0.40,
            frequency_base: 0.30,
            frequency_step: 0.05,
            low_value_below: 50.0,
            high_value_above: 200.0,
            low_value_risk: 0.20,
            mid_value_risk: 0.10,
            high_value_risk: 0.0,
            default_average_value: 100.0,
            jitter: 0.10,
            levels: LevelThresholds {
                high: 0.70,
                medium: 0.40,
            },
            confidence: ConfidenceConfig::default(),
            actions: ChurnActions::default(),
        }
    }
}

/// Retention hint attached to each churn result, by risk level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnActions {
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl Default for ChurnActions {
    fn default() -> Self {
        Self {
            high: "Send a personal win-back offer within 48 hours".into(),
            medium: "Add to a re-engagement campaign with tailored picks".into(),
            low: "Keep in the regular newsletter cadence".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandConfig {
    pub weights: DemandWeights,
    pub caps: DemandCaps,
    pub cold_start: ColdStart,
    pub confidence: DemandConfidence,
    pub levels: LevelThresholds,
    pub multipliers: MultiplierTable,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            weights: DemandWeights::default(),
            caps: DemandCaps::default(),
            cold_start: ColdStart::default(),
            confidence: DemandConfidence::default(),
            levels: LevelThresholds {
                high: 0.70,
                medium: 0.40,
            },
            multipliers: MultiplierTable::default_seed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandWeights {
    pub fan_base: f64,
    pub superfans: f64,
    pub engagement: f64,
    pub streaming: f64,
    pub recency: f64,
    pub utilization: f64,
}

impl Default for DemandWeights {
    fn default() -> Self {
        Self {
            fan_base: 0.30,
            superfans: 0.20,
            engagement: 0.20,
            streaming: 0.15,
            recency: 0.10,
            utilization: 0.05,
        }
    }
}

/// Value at which each demand sub-factor saturates at 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandCaps {
    pub fan_base: f64,
    pub superfans: f64,
    pub engagement: f64,
    pub streaming: f64,
    pub recent_activity: f64,
}

impl Default for DemandCaps {
    fn default() -> Self {
        Self {
            fan_base: 10_000.0,
            superfans: 100.0,
            engagement: 100.0,
            streaming: 1_000_000.0,
            recent_activity: 1_000.0,
        }
    }
}

/// `max(fan_base * fan_base_rate + streaming / streaming_divisor + superfans * superfan_rate, floor)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdStart {
    pub fan_base_rate: f64,
    pub streaming_divisor: f64,
    pub superfan_rate: f64,
    pub floor: f64,
}

impl Default for ColdStart {
    fn default() -> Self {
        Self {
            fan_base_rate: 0.15,
            streaming_divisor: 10.0,
            superfan_rate: 2.0,
            floor: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandConfidence {
    pub base: f64,
    pub ceiling: f64,
    pub fan_base_min: u64,
    pub fan_base_bonus: f64,
    pub streaming_min: u64,
    pub streaming_bonus: f64,
    pub concerts_min: u32,
    pub concerts_bonus: f64,
    pub recent_activity_min: u64,
    pub recent_activity_bonus: f64,
}

impl Default for DemandConfidence {
    fn default() -> Self {
        Self {
            base: 0.50,
            ceiling: 0.95,
            fan_base_min: 1_000,
            fan_base_bonus: 0.15,
            streaming_min: 10_000,
            streaming_bonus: 0.10,
            concerts_min: 1,
            concerts_bonus: 0.15,
            recent_activity_min: 10,
            recent_activity_bonus: 0.05,
        }
    }
}

/// Per-location demand multipliers. Keys are normalized location names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierTable {
    pub default_multiplier: f64,
    pub locations: HashMap<String, f64>,
    pub aliases: HashMap<String, String>,
    /// Minimum Jaro-Winkler similarity for the fuzzy fallback. 1.0 (the default)
    /// disables it; candidates must also have the same word count.
    pub fuzzy_min: f64,
}

impl Default for MultiplierTable {
    fn default() -> Self {
        Self {
            default_multiplier: 1.0,
            locations: HashMap::new(),
            aliases: HashMap::new(),
            fuzzy_min: 1.0,
        }
    }
}

impl MultiplierTable {
    /// Built-in table for common touring markets.
    pub fn default_seed() -> Self {
        let mut locations = HashMap::new();
        for (k, v) in [
            ("new york", 1.5),
            ("los angeles", 1.4),
            ("london", 1.4),
            ("chicago", 1.2),
            ("paris", 1.3),
            ("berlin", 1.2),
            ("toronto", 1.15),
            ("sydney", 1.1),
            ("tokyo", 1.3),
            ("mexico city", 1.2),
            ("sao paulo", 1.2),
        ] {
            locations.insert(k.to_string(), v);
        }
        let mut aliases = HashMap::new();
        for (a, c) in [
            ("nyc", "new york"),
            ("new york city", "new york"),
            ("la", "los angeles"),
            ("cdmx", "mexico city"),
            ("são paulo", "sao paulo"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }
        Self {
            locations,
            aliases,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    pub limit: usize,
    /// How far back purchases and views are fetched for the profile.
    pub history_days: u32,
    pub affinity_per_match: f64,
    pub affinity_cap: f64,
    pub view_boost: f64,
    pub view_window_days: u32,
    pub price_weight: f64,
    pub preference_boost: f64,
    pub new_item_boost: f64,
    pub new_item_days: u32,
    pub popularity_weight: f64,
    pub levels: LevelThresholds,
    pub confidence: ConfidenceConfig,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            history_days: 365,
            affinity_per_match: 0.15,
            affinity_cap: 0.45,
            view_boost: 0.20,
            view_window_days: 30,
            price_weight: 0.20,
            preference_boost: 0.25,
            new_item_boost: 0.05,
            new_item_days: 30,
            popularity_weight: 0.05,
            levels: LevelThresholds {
                high: 0.60,
                medium: 0.30,
            },
            confidence: ConfidenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub window_days: u32,
    pub stream_points: f64,
    pub stream_cap: f64,
    pub ticket_points: f64,
    pub ticket_cap: f64,
    pub merch_points: f64,
    pub merch_cap: f64,
    pub recency_points: f64,
    /// Full recency bonus when last activity is within this many days.
    pub recency_full_days: u32,
    pub superfan_above: f64,
    pub active_above: f64,
    pub casual_above: f64,
    pub high_volume_streams: u32,
    pub moderate_streams: u32,
    pub confidence: ConfidenceConfig,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            stream_points: 40.0,
            stream_cap: 100.0,
            ticket_points: 30.0,
            ticket_cap: 2.0,
            merch_points: 20.0,
            merch_cap: 3.0,
            recency_points: 10.0,
            recency_full_days: 7,
            superfan_above: 80.0,
            active_above: 60.0,
            casual_above: 30.0,
            high_volume_streams: 50,
            moderate_streams: 10,
            confidence: ConfidenceConfig::default(),
        }
    }
}

impl ScoringConfig {
    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scoring config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = Self::parse(&content, &ext)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve the config file:
    /// 1) $SCORING_CONFIG_PATH (must exist)
    /// 2) config/scoring.toml
    /// 3) config/scoring.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SCORING_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_SCORING_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_SCORING_CONFIG_PATH, FALLBACK_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return serde_json::from_str(s).context("parsing scoring config as JSON");
        }
        toml::from_str(s).context("parsing scoring config as TOML")
    }

    /// Repair values the scorers can't use: negative/non-finite weights, inverted
    /// thresholds, ceilings outside (0,1], windows outside `1..=MAX_WINDOW_DAYS`,
    /// multiplier keys not in lookup form.
    pub fn sanitize(&mut self) {
        let c = &mut self.churn;
        c.lookback_days = window_days(c.lookback_days);
        for w in [
            &mut c.recency_weight,
            &mut c.frequency_base,
            &mut c.frequency_step,
            &mut c.low_value_risk,
            &mut c.mid_value_risk,
            &mut c.high_value_risk,
            &mut c.jitter,
        ] {
            non_negative(w);
        }
        if !(c.default_average_value.is_finite() && c.default_average_value >= 0.0) {
            c.default_average_value = ChurnConfig::default().default_average_value;
        }
        if c.low_value_below > c.high_value_above {
            std::mem::swap(&mut c.low_value_below, &mut c.high_value_above);
        }
        sanitize_levels(&mut c.levels);
        sanitize_confidence(&mut c.confidence);

        let d = &mut self.demand;
        for w in [
            &mut d.weights.fan_base,
            &mut d.weights.superfans,
            &mut d.weights.engagement,
            &mut d.weights.streaming,
            &mut d.weights.recency,
            &mut d.weights.utilization,
            &mut d.cold_start.fan_base_rate,
            &mut d.cold_start.superfan_rate,
            &mut d.cold_start.floor,
            &mut d.confidence.fan_base_bonus,
            &mut d.confidence.streaming_bonus,
            &mut d.confidence.concerts_bonus,
            &mut d.confidence.recent_activity_bonus,
        ] {
            non_negative(w);
        }
        sanitize_ceiling(&mut d.confidence.ceiling);
        d.confidence.base = d.confidence.base.clamp(0.0, d.confidence.ceiling);
        if !d.confidence.base.is_finite() {
            d.confidence.base = 0.0;
        }
        if !(d.multipliers.default_multiplier.is_finite() && d.multipliers.default_multiplier > 0.0)
        {
            d.multipliers.default_multiplier = 1.0;
        }
        d.multipliers
            .locations
            .retain(|_, m| m.is_finite() && *m > 0.0);
        d.multipliers.normalize_keys();
        let fuzzy = d.multipliers.fuzzy_min;
        d.multipliers.fuzzy_min = if fuzzy.is_finite() { fuzzy.clamp(0.0, 1.0) } else { 1.0 };
        sanitize_levels(&mut d.levels);

        let r = &mut self.recommend;
        for w in [
            &mut r.affinity_per_match,
            &mut r.affinity_cap,
            &mut r.view_boost,
            &mut r.price_weight,
            &mut r.preference_boost,
            &mut r.new_item_boost,
            &mut r.popularity_weight,
        ] {
            non_negative(w);
        }
        r.limit = r.limit.max(1);
        r.view_window_days = window_days(r.view_window_days);
        r.new_item_days = window_days(r.new_item_days);
        r.history_days = window_days(r.history_days).max(r.view_window_days);
        sanitize_levels(&mut r.levels);
        sanitize_confidence(&mut r.confidence);

        let e = &mut self.engagement;
        e.window_days = window_days(e.window_days);
        e.recency_full_days = e.recency_full_days.min(e.window_days);
        for w in [
            &mut e.stream_points,
            &mut e.ticket_points,
            &mut e.merch_points,
            &mut e.recency_points,
        ] {
            non_negative(w);
        }
        sanitize_confidence(&mut e.confidence);
    }
}

fn window_days(days: u32) -> u32 {
    days.clamp(1, MAX_WINDOW_DAYS)
}

fn non_negative(w: &mut f64) {
    if !(w.is_finite() && *w >= 0.0) {
        *w = 0.0;
    }
}

fn sanitize_ceiling(c: &mut f64) {
    if !(c.is_finite() && *c > 0.0 && *c <= 1.0) {
        *c = 0.95;
    }
}

fn sanitize_confidence(c: &mut ConfidenceConfig) {
    sanitize_ceiling(&mut c.ceiling);
    non_negative(&mut c.base);
    non_negative(&mut c.per_event);
}

fn sanitize_levels(t: &mut LevelThresholds) {
    if !t.high.is_finite() {
        t.high = 0.70;
    }
    if !t.medium.is_finite() {
        t.medium = 0.40;
    }
    if t.medium > t.high {
        // swap to keep a valid step function
        std::mem::swap(&mut t.medium, &mut t.high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let cfg: ScoringConfig = toml::from_str(
            r#"
simulate = true

[churn]
lookback_days = 60

[demand.multipliers.locations]
"austin" = 1.1
"#,
        )
        .unwrap();
        assert!(cfg.simulate);
        assert_eq!(cfg.churn.lookback_days, 60);
        assert!((cfg.churn.recency_weight - 0.40).abs() < 1e-12);
        assert_eq!(cfg.demand.multipliers.locations.get("austin"), Some(&1.1));
        assert_eq!(cfg.recommend.limit, 5);
    }

    #[test]
    fn sanitize_swaps_inverted_thresholds_and_clears_bad_weights() {
        let mut cfg = ScoringConfig::default();
        cfg.churn.levels = LevelThresholds {
            high: 0.3,
            medium: 0.8,
        };
        cfg.churn.recency_weight = -1.0;
        cfg.churn.confidence.ceiling = 3.0;
        cfg.churn.lookback_days = 0;
        cfg.demand.multipliers.locations.insert("x".into(), -2.0);
        cfg.sanitize();

        assert_eq!(cfg.churn.levels.high, 0.8);
        assert_eq!(cfg.churn.levels.medium, 0.3);
        assert_eq!(cfg.churn.recency_weight, 0.0);
        assert_eq!(cfg.churn.confidence.ceiling, 0.95);
        assert_eq!(cfg.churn.lookback_days, 1);
        assert!(!cfg.demand.multipliers.locations.contains_key("x"));
    }

    #[test]
    fn sanitize_bounds_windows_and_fuzzy_threshold() {
        let mut cfg = ScoringConfig::default();
        cfg.churn.lookback_days = u32::MAX;
        cfg.recommend.view_window_days = 0;
        cfg.recommend.history_days = 50_000;
        cfg.recommend.new_item_days = 9_999;
        cfg.demand.multipliers.fuzzy_min = f64::NAN;
        cfg.sanitize();

        assert_eq!(cfg.churn.lookback_days, MAX_WINDOW_DAYS);
        assert_eq!(cfg.recommend.view_window_days, 1);
        assert_eq!(cfg.recommend.history_days, MAX_WINDOW_DAYS);
        assert_eq!(cfg.recommend.new_item_days, MAX_WINDOW_DAYS);
        assert_eq!(cfg.demand.multipliers.fuzzy_min, 1.0);

        cfg.demand.multipliers.fuzzy_min = -0.5;
        cfg.sanitize();
        assert_eq!(cfg.demand.multipliers.fuzzy_min, 0.0);
    }

    #[test]
    fn default_seed_has_major_markets() {
        let t = MultiplierTable::default_seed();
        assert_eq!(t.locations.get("new york"), Some(&1.5));
        assert_eq!(t.aliases.get("nyc").map(String::as_str), Some("new york"));
    }
}
