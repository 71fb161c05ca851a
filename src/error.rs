//! Error taxonomy.
//!
//! - `ScoringError`: per-item input validation inside the engine. Never retried.
//! - `SourceError`: data-source I/O (not found, upstream failure, undecodable rows).
//! - `UnknownVariant`: a level or tier name that parses to nothing.
//! - `ApiError` (in `api.rs`) maps both onto HTTP statuses.
//!
//! Sparse data is not an error anywhere: scorers fall back to defaults and
//! lower confidence instead.

/// Input rejected by a scorer. Rejects one batch item, never the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("{entity} at position {index} is missing a required `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
        index: usize,
    },
}

/// A level or tier name that matches no variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`, expected one of: {expected}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Failures raised by a `DataSource` implementation.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    #[error("data store request failed: {message}")]
    Upstream { message: String },

    #[error("data store returned undecodable {table} rows: {message}")]
    Decode { table: &'static str, message: String },

    #[error("data source is not configured: {0}")]
    NotConfigured(&'static str),
}

impl SourceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream {
            message: e.to_string(),
        }
    }
}
