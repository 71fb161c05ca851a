//! Live store backed by a PostgREST-style REST API.
//!
//! Tables (all filtered by `project_id=eq.<id>`):
//! `projects`, `subjects`, `activity_events`, `catalog_items`, `market_stats`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::DataSource;
use crate::error::SourceError;
use crate::model::{ActivityEvent, CandidateItem, MarketCandidate, MarketStats, Subject};

pub struct LiveSource {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl LiveSource {
    pub fn new(base_url: &str, service_key: String) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent("audience-scoring/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, SourceError> {
        let mut req = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "*")])
            .query(query);
        if !self.service_key.is_empty() {
            req = req
                .header("apikey", &self.service_key)
                .bearer_auth(&self.service_key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(table, %status, "store request failed");
            return Err(SourceError::Upstream {
                message: format!("{table}: HTTP {status}"),
            });
        }
        let rows = resp
            .json::<Vec<T>>()
            .await
            .map_err(|e| SourceError::Decode {
                table,
                message: e.to_string(),
            })?;
        debug!(table, rows = rows.len(), "store rows fetched");
        Ok(rows)
    }
}

fn eq(v: &str) -> String {
    format!("eq.{v}")
}

/// Location row: a candidate plus its aggregate counts, flattened in the store.
#[derive(Debug, Deserialize)]
struct MarketRow {
    #[serde(flatten)]
    item: CandidateItem,
    #[serde(flatten)]
    stats: MarketStats,
}

#[derive(Debug, Deserialize)]
struct ProjectRow {
    #[allow(dead_code)]
    id: String,
}

#[async_trait]
impl DataSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn project_exists(&self, project_id: &str) -> Result<bool, SourceError> {
        let rows: Vec<ProjectRow> = self
            .select("projects", &[("id", eq(project_id))])
            .await?;
        Ok(!rows.is_empty())
    }

    async fn subjects(&self, project_id: &str) -> Result<Vec<Subject>, SourceError> {
        self.select("subjects", &[("project_id", eq(project_id))])
            .await
    }

    async fn events(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, SourceError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.select(
            "activity_events",
            &[
                ("project_id", eq(project_id)),
                ("timestamp", format!("gte.{since}")),
            ],
        )
        .await
    }

    async fn catalog(&self, project_id: &str) -> Result<Vec<CandidateItem>, SourceError> {
        self.select("catalog_items", &[("project_id", eq(project_id))])
            .await
    }

    async fn markets(&self, project_id: &str) -> Result<Vec<MarketCandidate>, SourceError> {
        let rows: Vec<MarketRow> = self
            .select("market_stats", &[("project_id", eq(project_id))])
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| MarketCandidate {
                item: r.item,
                stats: r.stats,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_table_urls_without_double_slash() {
        let s = LiveSource::new("https://store.example/", String::new()).unwrap();
        assert_eq!(
            s.table_url("subjects"),
            "https://store.example/rest/v1/subjects"
        );
    }

    #[test]
    fn market_row_flattens_item_and_stats() {
        let row: MarketRow = serde_json::from_str(
            r#"{"id":"m1","category":"city","name":"Berlin","price_or_capacity":3000,
                "fan_base":1200,"superfans":15,"historical_concerts":2,
                "historical_avg_attendance":900.0}"#,
        )
        .unwrap();
        assert_eq!(row.item.name, "Berlin");
        assert_eq!(row.stats.fan_base, 1200);
        assert_eq!(row.stats.historical_avg_attendance, Some(900.0));
    }
}
