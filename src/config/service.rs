// src/config/service.rs
use serde::{Deserialize, Serialize};

/// Which `DataSource` implementation the service wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Live,
    Synthetic,
}

/// Runtime settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Accepted bearer tokens. Empty means every request is rejected with 401.
    pub api_tokens: Vec<String>,
    pub source: SourceKind,
    /// Base URL of the PostgREST-style store, e.g. `https://xyz.example.co`.
    pub store_url: Option<String>,
    pub store_service_key: Option<String>,
    /// Presence of this URL is what "prediction service connected" means.
    pub prediction_service_url: Option<String>,
    pub simulate: bool,
    pub seed: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_tokens: Vec::new(),
            source: SourceKind::Synthetic,
            store_url: None,
            store_service_key: None,
            prediction_service_url: None,
            simulate: false,
            seed: 42,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup (tests pass a map instead of touching the process env).
    ///
    /// - `SCORING_API_TOKENS`: comma-separated list
    /// - `DATA_SOURCE`: `live` | `synthetic` (default synthetic; `live` without `STORE_URL` falls back)
    /// - `STORE_URL`, `STORE_SERVICE_KEY`, `PREDICTION_SERVICE_URL`
    /// - `SCORING_SIMULATE`: `1`/`true`
    /// - `SCORING_SEED`: u64
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_tokens = non_empty("SCORING_API_TOKENS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let store_url = non_empty("STORE_URL").map(|u| u.trim_end_matches('/').to_string());
        let source = match non_empty("DATA_SOURCE").map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "live" && store_url.is_some() => SourceKind::Live,
            _ => SourceKind::Synthetic,
        };

        let simulate = non_empty("SCORING_SIMULATE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let seed = non_empty("SCORING_SEED")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(42);

        Self {
            api_tokens,
            source,
            store_url,
            store_service_key: non_empty("STORE_SERVICE_KEY"),
            prediction_service_url: non_empty("PREDICTION_SERVICE_URL"),
            simulate,
            seed,
        }
    }

    pub fn prediction_service_connected(&self) -> bool {
        self.prediction_service_url.is_some()
    }
}
