//! Data source abstraction: where subjects, events, catalog and market rows come from.
//!
//! The scorers never branch on live vs. demo data. Callers pick one
//! implementation up front and hand it to the router as `Arc<dyn DataSource>`.

pub mod live;
pub mod synthetic;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{ServiceConfig, SourceKind};
use crate::error::SourceError;
use crate::model::{ActivityEvent, CandidateItem, MarketCandidate, Subject};

pub use live::LiveSource;
pub use synthetic::SyntheticSource;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name for diagnostics/logs.
    fn name(&self) -> &'static str;

    async fn project_exists(&self, project_id: &str) -> Result<bool, SourceError>;

    async fn subjects(&self, project_id: &str) -> Result<Vec<Subject>, SourceError>;

    /// Events at or after `since`.
    async fn events(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, SourceError>;

    async fn catalog(&self, project_id: &str) -> Result<Vec<CandidateItem>, SourceError>;

    async fn markets(&self, project_id: &str) -> Result<Vec<MarketCandidate>, SourceError>;
}

pub type DynSource = Arc<dyn DataSource>;

/// Factory: live store when configured, synthetic generator otherwise.
pub fn build_source(cfg: &ServiceConfig) -> Result<DynSource, SourceError> {
    match cfg.source {
        SourceKind::Live => {
            let url = cfg
                .store_url
                .as_deref()
                .ok_or(SourceError::NotConfigured("STORE_URL"))?;
            let key = cfg.store_service_key.clone().unwrap_or_default();
            Ok(Arc::new(LiveSource::new(url, key)?))
        }
        SourceKind::Synthetic => Ok(Arc::new(SyntheticSource::new(cfg.seed))),
    }
}
