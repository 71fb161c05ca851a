//! Configuration: scorer tuning (`ScoringConfig`, file-based) and service wiring
//! (`ServiceConfig`, env-based). Nothing in the scorers reads the environment.

pub mod scoring;
pub mod service;

pub use scoring::{
    ChurnActions, ChurnConfig, ColdStart, ConfidenceConfig, DemandCaps, DemandConfidence,
    DemandConfig, DemandWeights, EngagementConfig, LevelThresholds, MultiplierTable,
    RecommendConfig, ScoringConfig, DEFAULT_SCORING_CONFIG_PATH, ENV_SCORING_CONFIG_PATH,
    MAX_WINDOW_DAYS,
};
pub use service::{ServiceConfig, SourceKind};
