//! model.rs: entities consumed by the scoring engine and the result shape it emits.
//!
//! Everything here is read-only input owned by an external store, except
//! `ScoreResult`, which is the engine's only output. Field names are snake_case
//! on the wire for inputs (they mirror store rows) and camelCase for results
//! (they mirror the HTTP contract).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UnknownVariant;
use crate::scoring::clamp01;

/// The customer or fan being scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    /// Total spend so far. `None` when the store has no value data.
    #[serde(default)]
    pub lifetime_value: Option<f64>,
    /// Order count behind `lifetime_value`, used to derive an average.
    #[serde(default)]
    pub lifetime_orders: Option<u32>,
    /// Pre-existing risk/engagement label from the store (informational).
    #[serde(default)]
    pub label: Option<String>,
    /// Explicit superfan flag; wins over any computed engagement score.
    #[serde(default)]
    pub superfan: bool,
    /// Preferred categories or item ids (case-insensitive).
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            last_active_at: None,
            lifetime_value: None,
            lifetime_orders: None,
            label: None,
            superfan: false,
            preferences: Vec::new(),
        }
    }

    pub fn lifetime(mut self, value: f64, orders: u32) -> Self {
        self.lifetime_value = Some(value);
        self.lifetime_orders = Some(orders);
        self
    }

    pub fn superfan(mut self, flag: bool) -> Self {
        self.superfan = flag;
        self
    }

    pub fn prefers(mut self, pref: impl Into<String>) -> Self {
        self.preferences.push(pref.into());
        self
    }
}

/// Interaction kinds. Orders, tickets and merch carry money; streams and views don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Order,
    Stream,
    Ticket,
    Merch,
    View,
}

impl EventKind {
    /// True for kinds that count as an acquisition of `item_id`.
    pub fn is_purchase(self) -> bool {
        matches!(self, EventKind::Order | EventKind::Ticket | EventKind::Merch)
    }
}

/// A timestamped interaction tied to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub subject_id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl ActivityEvent {
    pub fn new(subject_id: impl Into<String>, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            kind,
            timestamp,
            amount: None,
            quantity: None,
            location: None,
            item_id: None,
            category: None,
        }
    }

    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn item(mut self, item_id: impl Into<String>, category: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self.category = Some(category.into());
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// A product, city or track that can be recommended or forecast against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: String,
    #[serde(default)]
    pub category: String,
    /// Display name; for locations this is the city used for multiplier lookup.
    #[serde(default)]
    pub name: String,
    /// Price for products, venue capacity for locations.
    #[serde(default)]
    pub price_or_capacity: f64,
    /// Prior popularity signal in [0,1].
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl CandidateItem {
    pub fn new(id: impl Into<String>, category: impl Into<String>, price_or_capacity: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: category.into(),
            price_or_capacity,
            popularity: 0.0,
            added_at: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn popularity(mut self, p: f64) -> Self {
        self.popularity = p;
        self
    }

    pub fn added_at(mut self, ts: DateTime<Utc>) -> Self {
        self.added_at = Some(ts);
        self
    }
}

/// Aggregate audience counts for one location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    #[serde(default)]
    pub fan_base: u64,
    #[serde(default)]
    pub superfans: u64,
    /// Average engagement score of the location's fans, 0–100.
    #[serde(default)]
    pub avg_engagement: f64,
    #[serde(default)]
    pub streaming_volume: u64,
    /// Interactions in the recent window.
    #[serde(default)]
    pub recent_activity: u64,
    #[serde(default)]
    pub historical_concerts: u32,
    #[serde(default)]
    pub historical_avg_attendance: Option<f64>,
    /// Past sold/capacity ratio, 0–1.
    #[serde(default)]
    pub capacity_utilization: Option<f64>,
}

/// A location candidate paired with its market counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCandidate {
    pub item: CandidateItem,
    #[serde(default)]
    pub stats: MarketStats,
}

/// Three-step level used for churn risk, demand band and match strength.
/// Ordering is meaningful: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

/// Fan engagement tiers. Ordering is meaningful: `AtRisk < Casual < Active < Superfan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementTier {
    AtRisk,
    Casual,
    Active,
    Superfan,
}

/// Lowercase, with `-` and spaces read as `_`.
fn variant_key(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

/// Case-insensitive: `"HIGH"` and `"High"` parse like `"high"`.
impl FromStr for Level {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match variant_key(s).as_str() {
            "low" => Ok(Level::Low),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            _ => Err(UnknownVariant {
                kind: "level",
                value: s.to_string(),
                expected: "low, medium, high",
            }),
        }
    }
}

/// Case-insensitive; `"At-Risk"` and `"at risk"` parse like `"at_risk"`.
impl FromStr for EngagementTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match variant_key(s).as_str() {
            "at_risk" => Ok(EngagementTier::AtRisk),
            "casual" => Ok(EngagementTier::Casual),
            "active" => Ok(EngagementTier::Active),
            "superfan" => Ok(EngagementTier::Superfan),
            _ => Err(UnknownVariant {
                kind: "tier",
                value: s.to_string(),
                expected: "at_risk, casual, active, superfan",
            }),
        }
    }
}

/// Discrete bucket attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Tier {
    Level(Level),
    Engagement(EngagementTier),
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Level(Level::Low) => "low",
            Tier::Level(Level::Medium) => "medium",
            Tier::Level(Level::High) => "high",
            Tier::Engagement(EngagementTier::AtRisk) => "at_risk",
            Tier::Engagement(EngagementTier::Casual) => "casual",
            Tier::Engagement(EngagementTier::Active) => "active",
            Tier::Engagement(EngagementTier::Superfan) => "superfan",
        };
        f.write_str(s)
    }
}

impl From<Level> for Tier {
    fn from(l: Level) -> Self {
        Tier::Level(l)
    }
}

impl From<EngagementTier> for Tier {
    fn from(t: EngagementTier) -> Self {
        Tier::Engagement(t)
    }
}

/// One explainability entry: a normalized signal and what it added to the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Factor {
    pub name: &'static str,
    /// Signal after normalization, in [0,1].
    pub value: f64,
    /// Amount the signal added to the raw score.
    pub contribution: f64,
}

impl Factor {
    pub fn new(name: &'static str, value: f64, contribution: f64) -> Self {
        Self {
            name,
            value: clamp01(value),
            contribution,
        }
    }
}

/// Engine output for a single subject or candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub id: String,
    /// Primary probability/score, always in [0,1].
    pub score: f64,
    /// Forecast magnitude (e.g. predicted attendance). Sorts ahead of `score` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    pub tier: Tier,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<Factor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ScoreResult {
    /// Score is clamped into [0,1]; confidence is clamped by the caller against its ceiling.
    pub fn new(id: impl Into<String>, score: f64, tier: impl Into<Tier>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            score: clamp01(score),
            magnitude: None,
            tier: tier.into(),
            confidence: clamp01(confidence),
            factors: Vec::new(),
            reason: None,
            suggested_action: None,
        }
    }

    pub fn magnitude(mut self, m: f64) -> Self {
        self.magnitude = Some(if m.is_finite() { m.max(0.0) } else { 0.0 });
        self
    }

    pub fn with_factor(mut self, f: Factor) -> Self {
        self.factors.push(f);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    /// The value results are ordered by.
    pub fn primary(&self) -> f64 {
        self.magnitude.unwrap_or(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_and_tier_names_parse_case_insensitively() {
        assert_eq!("HIGH".parse::<Level>(), Ok(Level::High));
        assert_eq!(" Medium ".parse::<Level>(), Ok(Level::Medium));
        assert_eq!("At_Risk".parse::<EngagementTier>(), Ok(EngagementTier::AtRisk));
        assert_eq!("at-risk".parse::<EngagementTier>(), Ok(EngagementTier::AtRisk));
        assert_eq!("SUPERFAN".parse::<EngagementTier>(), Ok(EngagementTier::Superfan));

        let err = "extreme".parse::<Level>().unwrap_err();
        assert_eq!(err.value, "extreme");
        assert!(err.to_string().contains("low, medium, high"));
        assert!("superfans".parse::<EngagementTier>().is_err());
    }

    #[test]
    fn result_serializes_camel_case_with_flat_tier() {
        let r = ScoreResult::new("c1", 0.82, Level::High, 0.6)
            .with_factor(Factor::new("recency", 1.0, 0.4))
            .with_action("Send a win-back offer");

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["id"], json!("c1"));
        assert_eq!(v["tier"], json!("high"));
        assert_eq!(v["suggestedAction"], json!("Send a win-back offer"));
        assert!(v.get("magnitude").is_none());
        assert_eq!(v["factors"][0]["name"], json!("recency"));
    }

    #[test]
    fn engagement_tier_serializes_snake_case() {
        let r = ScoreResult::new("f1", 0.1, EngagementTier::AtRisk, 0.3);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["tier"], json!("at_risk"));
    }

    #[test]
    fn constructor_clamps_out_of_range_values() {
        let r = ScoreResult::new("x", 1.7, Level::High, -0.2);
        assert_eq!(r.score, 1.0);
        assert_eq!(r.confidence, 0.0);

        let nan = ScoreResult::new("y", f64::NAN, Level::Low, 0.5);
        assert_eq!(nan.score, 0.0);
    }

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(Level::Low < Level::Medium && Level::Medium < Level::High);
        assert!(EngagementTier::AtRisk < EngagementTier::Casual);
        assert!(EngagementTier::Active < EngagementTier::Superfan);
    }

    #[test]
    fn subject_deserializes_with_defaults() {
        let s: Subject = serde_json::from_str(r#"{"id":"c9"}"#).unwrap();
        assert_eq!(s.id, "c9");
        assert!(s.lifetime_value.is_none());
        assert!(!s.superfan);
        assert!(s.preferences.is_empty());
    }
}
