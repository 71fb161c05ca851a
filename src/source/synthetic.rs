//! Deterministic demo data.
//!
//! Every table is generated from `(seed, project_id, table)` so repeated calls
//! return identical rows, and results for one project never depend on which
//! other projects were queried first.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::DataSource;
use crate::error::SourceError;
use crate::model::{
    ActivityEvent, CandidateItem, EventKind, MarketCandidate, MarketStats, Subject,
};

const CATEGORIES: [&str; 6] = ["dresses", "shoes", "accessories", "outerwear", "vinyl", "tees"];
const CITIES: [&str; 10] = [
    "New York",
    "Los Angeles",
    "London",
    "Chicago",
    "Berlin",
    "Austin",
    "Toronto",
    "Manchester",
    "Lisbon",
    "Seoul",
];
const HISTORY_DAYS: i64 = 90;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    projects: HashSet<String>,
    anchor: DateTime<Utc>,
    subjects_per_project: usize,
    catalog_size: usize,
}

impl SyntheticSource {
    /// Knows a single project, `demo`, anchored at the current hour.
    pub fn new(seed: u64) -> Self {
        let now = Utc::now();
        let anchor = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        Self {
            seed,
            projects: HashSet::from(["demo".to_string()]),
            anchor,
            subjects_per_project: 40,
            catalog_size: 24,
        }
    }

    pub fn with_projects<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Fix the clock generated timestamps are relative to.
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_size(mut self, subjects: usize, catalog: usize) -> Self {
        self.subjects_per_project = subjects;
        self.catalog_size = catalog;
        self
    }

    fn rng_for(&self, project_id: &str, table: &str) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(project_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(table.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        StdRng::from_seed(bytes)
    }

    fn ensure_known(&self, project_id: &str) -> Result<(), SourceError> {
        if self.projects.contains(project_id) {
            Ok(())
        } else {
            Err(SourceError::not_found("project", project_id))
        }
    }

    fn subject_id(project_id: &str, i: usize) -> String {
        format!("{project_id}-fan-{i:03}")
    }

    fn ago(&self, rng: &mut StdRng, max_days: i64) -> DateTime<Utc> {
        let secs = rng.random_range(0..max_days.max(1) * 86_400);
        self.anchor - Duration::seconds(secs)
    }

    pub fn generate_subjects(&self, project_id: &str) -> Vec<Subject> {
        let mut rng = self.rng_for(project_id, "subjects");
        (0..self.subjects_per_project)
            .map(|i| {
                let mut s = Subject::new(Self::subject_id(project_id, i));
                s.created_at = Some(self.ago(&mut rng, 720));
                if rng.random_bool(0.9) {
                    let orders = rng.random_range(0..30u32);
                    let avg = rng.random_range(15.0..400.0);
                    s.lifetime_value = Some((f64::from(orders) * avg * 100.0).round() / 100.0);
                    s.lifetime_orders = Some(orders);
                }
                s.superfan = rng.random_bool(0.05);
                for _ in 0..rng.random_range(0..3usize) {
                    let cat = CATEGORIES[rng.random_range(0..CATEGORIES.len())];
                    if !s.preferences.iter().any(|p| p == cat) {
                        s.preferences.push(cat.to_string());
                    }
                }
                s
            })
            .collect()
    }

    pub fn generate_catalog(&self, project_id: &str) -> Vec<CandidateItem> {
        let mut rng = self.rng_for(project_id, "catalog");
        (0..self.catalog_size)
            .map(|i| {
                let category = CATEGORIES[i % CATEGORIES.len()];
                let price = (rng.random_range(20.0..350.0_f64) * 100.0).round() / 100.0;
                CandidateItem::new(format!("sku-{i:03}"), category, price)
                    .named(format!("{category} #{i}"))
                    .popularity(rng.random::<f64>())
                    .added_at(self.ago(&mut rng, 120))
            })
            .collect()
    }

    pub fn generate_events(&self, project_id: &str) -> Vec<ActivityEvent> {
        let mut rng = self.rng_for(project_id, "events");
        let catalog = self.generate_catalog(project_id);
        let mut out = Vec::new();

        for i in 0..self.subjects_per_project {
            let sid = Self::subject_id(project_id, i);
            // Activity profile: dormant, light, regular, heavy.
            let (count, window_days) = match rng.random_range(0..10u8) {
                0 | 1 => (rng.random_range(0..3usize), HISTORY_DAYS),
                2..=4 => (rng.random_range(2..12usize), 45),
                5..=7 => (rng.random_range(10..60usize), 30),
                _ => (rng.random_range(60..160usize), 21),
            };
            for _ in 0..count {
                let ts = self.ago(&mut rng, window_days);
                let kind = match rng.random_range(0..20u8) {
                    0..=9 => EventKind::Stream,
                    10..=13 => EventKind::View,
                    14..=16 => EventKind::Order,
                    17..=18 => EventKind::Merch,
                    _ => EventKind::Ticket,
                };
                let mut e = ActivityEvent::new(sid.clone(), kind, ts);
                match kind {
                    EventKind::Order | EventKind::View | EventKind::Merch if !catalog.is_empty() => {
                        let item = &catalog[rng.random_range(0..catalog.len())];
                        e = e.item(item.id.clone(), item.category.clone());
                        if kind != EventKind::View {
                            let jitter = rng.random_range(0.8..1.2);
                            e = e.amount((item.price_or_capacity * jitter * 100.0).round() / 100.0);
                        }
                    }
                    EventKind::Ticket => {
                        e = e
                            .amount(rng.random_range(35.0..180.0_f64).round())
                            .at(CITIES[rng.random_range(0..CITIES.len())]);
                    }
                    _ => {}
                }
                out.push(e);
            }
        }
        out
    }

    pub fn generate_markets(&self, project_id: &str) -> Vec<MarketCandidate> {
        let mut rng = self.rng_for(project_id, "markets");
        CITIES
            .iter()
            .enumerate()
            .map(|(i, city)| {
                let fan_base = rng.random_range(500..40_000u64);
                let concerts = if rng.random_bool(0.6) {
                    rng.random_range(1..6u32)
                } else {
                    0
                };
                let stats = MarketStats {
                    fan_base,
                    superfans: fan_base / rng.random_range(50..400u64),
                    avg_engagement: (rng.random_range(20.0..90.0_f64) * 10.0).round() / 10.0,
                    streaming_volume: fan_base * rng.random_range(5..40u64),
                    recent_activity: rng.random_range(0..2_000u64),
                    historical_concerts: concerts,
                    historical_avg_attendance: (concerts > 0)
                        .then(|| rng.random_range(800.0..15_000.0_f64).round()),
                    capacity_utilization: (concerts > 0)
                        .then(|| (rng.random_range(0.5..1.0_f64) * 100.0).round() / 100.0),
                };
                let capacity = f64::from(rng.random_range(1_000..20_000u32));
                MarketCandidate {
                    item: CandidateItem::new(format!("loc-{i:02}"), "city", capacity).named(*city),
                    stats,
                }
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn project_exists(&self, project_id: &str) -> Result<bool, SourceError> {
        Ok(self.projects.contains(project_id))
    }

    async fn subjects(&self, project_id: &str) -> Result<Vec<Subject>, SourceError> {
        self.ensure_known(project_id)?;
        Ok(self.generate_subjects(project_id))
    }

    async fn events(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, SourceError> {
        self.ensure_known(project_id)?;
        let mut events = self.generate_events(project_id);
        events.retain(|e| e.timestamp >= since);
        Ok(events)
    }

    async fn catalog(&self, project_id: &str) -> Result<Vec<CandidateItem>, SourceError> {
        self.ensure_known(project_id)?;
        Ok(self.generate_catalog(project_id))
    }

    async fn markets(&self, project_id: &str) -> Result<Vec<MarketCandidate>, SourceError> {
        self.ensure_known(project_id)?;
        Ok(self.generate_markets(project_id))
    }
}
