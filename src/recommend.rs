//! # Recommendation Ranker
//! Ranks catalog items a subject has not acquired yet.
//!
//! Signals per candidate (all increments come from `RecommendConfig`):
//!   - preference match      : fixed boost when category or id is in the subject's list
//!   - category affinity     : per matching past purchase, capped
//!   - recent view           : fixed boost if viewed in the window but never bought
//!   - price proximity       : `weight / (1 + |price - avg| / avg)`
//!   - new arrival           : linear decay over `new_item_days`
//!   - popularity            : `weight * popularity`
//!
//! The reason text names the largest signal; ties go to the earlier entry above.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::RecommendConfig;
use crate::model::{ActivityEvent, CandidateItem, EventKind, Factor, ScoreResult, Subject};
use crate::scoring::{
    clamp01, days_before, days_between, evidence_confidence, level_for, ratio, sort_results,
};

/// Signals in reason-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Preference,
    CategoryAffinity,
    RecentView,
    PriceMatch,
    NewArrival,
    Popularity,
}

impl Signal {
    const PRIORITY: [Signal; 6] = [
        Signal::Preference,
        Signal::CategoryAffinity,
        Signal::RecentView,
        Signal::PriceMatch,
        Signal::NewArrival,
        Signal::Popularity,
    ];

    fn name(self) -> &'static str {
        match self {
            Signal::Preference => "preference",
            Signal::CategoryAffinity => "category_affinity",
            Signal::RecentView => "recent_view",
            Signal::PriceMatch => "price_match",
            Signal::NewArrival => "new_arrival",
            Signal::Popularity => "popularity",
        }
    }

    fn reason(self, item: &CandidateItem) -> String {
        match self {
            Signal::Preference => format!("Matches your saved preference for {}", item.category),
            Signal::CategoryAffinity => format!("Because you often buy {}", item.category),
            Signal::RecentView => "You viewed this recently".to_string(),
            Signal::PriceMatch => "In your usual price range".to_string(),
            Signal::NewArrival => "New arrival".to_string(),
            Signal::Popularity => "Popular right now".to_string(),
        }
    }
}

/// What the ranker knows about a subject's history, derived once per call.
#[derive(Debug, Default)]
struct Profile<'a> {
    acquired: HashSet<&'a str>,
    viewed: HashSet<&'a str>,
    category_counts: HashMap<String, usize>,
    average_spend: Option<f64>,
    preferences: HashSet<String>,
    evidence: usize,
}

impl<'a> Profile<'a> {
    fn build(
        subject: &Subject,
        history: &'a [&'a ActivityEvent],
        catalog: &'a [CandidateItem],
        cfg: &RecommendConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let category_of: HashMap<&str, &str> = catalog
            .iter()
            .map(|c| (c.id.as_str(), c.category.as_str()))
            .collect();
        let view_start = days_before(now, cfg.view_window_days);

        let mut p = Profile {
            preferences: subject
                .preferences
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            ..Profile::default()
        };
        let mut spend = Vec::new();

        for e in history.iter().filter(|e| e.subject_id == subject.id) {
            p.evidence += 1;
            let item = e.item_id.as_deref();
            if e.kind.is_purchase() {
                if let Some(id) = item {
                    p.acquired.insert(id);
                }
                let category = e
                    .category
                    .as_deref()
                    .or_else(|| item.and_then(|id| category_of.get(id).copied()));
                if let Some(cat) = category {
                    *p.category_counts.entry(cat.to_lowercase()).or_default() += 1;
                }
                if let Some(a) = e.amount.filter(|a| a.is_finite() && *a > 0.0) {
                    spend.push(a);
                }
            } else if e.kind == EventKind::View && e.timestamp >= view_start {
                if let Some(id) = item {
                    p.viewed.insert(id);
                }
            }
        }

        if !spend.is_empty() {
            p.average_spend = Some(spend.iter().sum::<f64>() / spend.len() as f64);
        }
        p
    }

    fn signals(
        &self,
        item: &CandidateItem,
        cfg: &RecommendConfig,
        now: DateTime<Utc>,
    ) -> [(Signal, f64, f64); 6] {
        let category = item.category.to_lowercase();

        let preferred = self.preferences.contains(&category)
            || self.preferences.contains(&item.id.to_lowercase());
        let preference = if preferred { cfg.preference_boost } else { 0.0 };

        let matches = self.category_counts.get(&category).copied().unwrap_or(0);
        let affinity = (matches as f64 * cfg.affinity_per_match).min(cfg.affinity_cap);

        let viewed = self.viewed.contains(item.id.as_str());
        let view = if viewed { cfg.view_boost } else { 0.0 };

        let (price_norm, price) = match self.average_spend {
            Some(avg) if item.price_or_capacity.is_finite() && item.price_or_capacity > 0.0 => {
                let distance = ratio((item.price_or_capacity - avg).abs(), avg);
                let closeness = 1.0 / (1.0 + distance);
                (closeness, cfg.price_weight * closeness)
            }
            _ => (0.0, 0.0),
        };

        let freshness = match item.added_at {
            Some(ts) => {
                let age = days_between(ts, now);
                clamp01(1.0 - ratio(age, f64::from(cfg.new_item_days)))
            }
            None => 0.0,
        };
        let popularity = clamp01(item.popularity);

        [
            (Signal::Preference, f64::from(u8::from(preferred)), preference),
            (
                Signal::CategoryAffinity,
                ratio(affinity, cfg.affinity_cap),
                affinity,
            ),
            (Signal::RecentView, f64::from(u8::from(viewed)), view),
            (Signal::PriceMatch, price_norm, price),
            (Signal::NewArrival, freshness, cfg.new_item_boost * freshness),
            (Signal::Popularity, popularity, cfg.popularity_weight * popularity),
        ]
    }
}

/// Top-N unacquired items for `subject`. Empty catalog → empty list.
///
/// `history` may include other subjects' events; they are ignored.
/// `limit` of `None` uses `cfg.limit`.
pub fn recommend(
    subject: &Subject,
    history: &[&ActivityEvent],
    catalog: &[CandidateItem],
    cfg: &RecommendConfig,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Vec<ScoreResult> {
    if catalog.is_empty() {
        return Vec::new();
    }

    let profile = Profile::build(subject, history, catalog, cfg, now);
    let confidence = evidence_confidence(profile.evidence, &cfg.confidence);

    let mut out = catalog
        .iter()
        .filter(|item| !item.id.is_empty() && !profile.acquired.contains(item.id.as_str()))
        .map(|item| {
            let signals = profile.signals(item, cfg, now);
            let raw: f64 = signals.iter().map(|(_, _, c)| c).sum();
            let score = clamp01(raw);

            let mut result =
                ScoreResult::new(item.id.clone(), score, level_for(score, &cfg.levels), confidence);
            if let Some(top) = dominant(&signals) {
                result = result.with_reason(top.reason(item));
            }
            for (sig, value, contribution) in signals {
                if contribution > 0.0 {
                    result = result.with_factor(Factor::new(sig.name(), value, contribution));
                }
            }
            result
        })
        .collect::<Vec<_>>();

    sort_results(&mut out);
    out.truncate(limit.unwrap_or(cfg.limit));
    out
}

/// Largest positive contribution; ties resolved by `Signal::PRIORITY` order.
fn dominant(signals: &[(Signal, f64, f64)]) -> Option<Signal> {
    let mut best: Option<(Signal, f64)> = None;
    for sig in Signal::PRIORITY {
        let c = signals
            .iter()
            .find(|(s, _, _)| *s == sig)
            .map(|(_, _, c)| *c)
            .unwrap_or(0.0);
        if c <= 0.0 {
            continue;
        }
        match best {
            Some((_, b)) if c <= b => {}
            _ => best = Some((sig, c)),
        }
    }
    best.map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn buy(item: &str, cat: &str, amount: f64) -> ActivityEvent {
        ActivityEvent::new("c1", EventKind::Order, now() - Duration::days(5))
            .amount(amount)
            .item(item, cat)
    }

    fn view(item: &str) -> ActivityEvent {
        let mut e = ActivityEvent::new("c1", EventKind::View, now() - Duration::days(2));
        e.item_id = Some(item.to_string());
        e
    }

    fn catalog() -> Vec<CandidateItem> {
        vec![
            CandidateItem::new("dress-1", "dresses", 80.0),
            CandidateItem::new("dress-2", "dresses", 300.0),
            CandidateItem::new("boots-1", "shoes", 120.0),
            CandidateItem::new("scarf-1", "accessories", 25.0),
        ]
    }

    #[test]
    fn empty_catalog_is_empty_list() {
        let cfg = RecommendConfig::default();
        let out = recommend(&Subject::new("c1"), &[], &[], &cfg, now(), None);
        assert!(out.is_empty());
    }

    #[test]
    fn excludes_acquired_and_ranks_by_affinity() {
        let cfg = RecommendConfig::default();
        let evs = vec![buy("dress-1", "dresses", 90.0), buy("dress-9", "dresses", 70.0)];
        let hist: Vec<_> = evs.iter().collect();
        let out = recommend(&Subject::new("c1"), &hist, &catalog(), &cfg, now(), None);

        assert!(out.iter().all(|r| r.id != "dress-1"));
        assert_eq!(out[0].id, "dress-2");
        assert_eq!(
            out[0].reason.as_deref(),
            Some("Because you often buy dresses")
        );
        for w in out.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn preference_wins_reason_ties() {
        let mut cfg = RecommendConfig::default();
        cfg.preference_boost = 0.15;
        cfg.affinity_per_match = 0.15;
        let evs = vec![buy("boots-9", "shoes", 0.0)];
        let hist: Vec<_> = evs.iter().collect();
        let s = Subject::new("c1").prefers("Shoes");
        let out = recommend(&s, &hist, &catalog(), &cfg, now(), Some(1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "boots-1");
        assert_eq!(
            out[0].reason.as_deref(),
            Some("Matches your saved preference for shoes")
        );
    }

    #[test]
    fn viewed_but_not_bought_gets_boost() {
        let cfg = RecommendConfig::default();
        let evs = vec![view("scarf-1")];
        let hist: Vec<_> = evs.iter().collect();
        let out = recommend(&Subject::new("c1"), &hist, &catalog(), &cfg, now(), None);
        assert_eq!(out[0].id, "scarf-1");
        assert_eq!(out[0].reason.as_deref(), Some("You viewed this recently"));
    }

    #[test]
    fn no_history_ranks_by_popularity_and_truncates() {
        let cfg = RecommendConfig::default();
        let cat = vec![
            CandidateItem::new("a", "x", 10.0).popularity(0.2),
            CandidateItem::new("b", "x", 10.0).popularity(0.9),
            CandidateItem::new("c", "x", 10.0),
        ];
        let out = recommend(&Subject::new("c1"), &[], &cat, &cfg, now(), Some(2));
        let ids: Vec<_> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert!(out[0].confidence <= cfg.confidence.ceiling);
    }

    #[test]
    fn price_proximity_prefers_closer_items() {
        let cfg = RecommendConfig::default();
        let evs = vec![buy("z", "other", 100.0)];
        let hist: Vec<_> = evs.iter().collect();
        let cat = vec![
            CandidateItem::new("far", "x", 400.0),
            CandidateItem::new("near", "x", 110.0),
        ];
        let out = recommend(&Subject::new("c1"), &hist, &cat, &cfg, now(), None);
        assert_eq!(out[0].id, "near");
        assert_eq!(out[0].reason.as_deref(), Some("In your usual price range"));
    }
}
