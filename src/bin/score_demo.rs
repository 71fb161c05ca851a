//! Runs the synthetic source through all four scorers and prints a summary per scorer.
//!
//! Usage: `cargo run --bin score-demo [seed]` (set `SCORING_SIMULATE=1` for churn jitter).

use audience_scoring::config::{ScoringConfig, ServiceConfig};
use audience_scoring::source::{DataSource, SyntheticSource};
use audience_scoring::{engine, NoJitter, RandomSource, SeededRandom};
use chrono::Utc;

const PROJECT: &str = "demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let service = ServiceConfig::from_env();
    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(service.seed);

    let mut cfg = ScoringConfig::load_default()?;
    cfg.simulate |= service.simulate;
    let source = SyntheticSource::new(seed);
    let now = Utc::now();

    let subjects = source.subjects(PROJECT).await?;
    let events = source.events(PROJECT, now - chrono::Duration::days(365)).await?;
    let catalog = source.catalog(PROJECT).await?;
    let markets = source.markets(PROJECT).await?;

    let mut rng: Box<dyn RandomSource> = if cfg.simulate {
        Box::new(SeededRandom::new(seed))
    } else {
        Box::new(NoJitter)
    };

    let churn = engine::score_churn(&subjects, &events, &cfg, now, rng.as_mut());
    let demand = engine::forecast_demand(&markets, &cfg);
    let fans = engine::classify_engagement(&subjects, &events, &cfg, now);

    println!("churn      {}", serde_json::to_string(&churn.metadata(&cfg))?);
    println!("demand     {}", serde_json::to_string(&demand.metadata(&cfg))?);
    println!("engagement {}", serde_json::to_string(&fans.metadata(&cfg))?);

    if let Some(top) = churn.results.first() {
        println!("highest churn risk: {}", serde_json::to_string_pretty(top)?);
    }
    if let Some(top) = demand.results.first() {
        println!("strongest market: {}", serde_json::to_string_pretty(top)?);
    }
    if let Some(subject) = subjects.first() {
        let recs = engine::recommend_for(subject, &events, &catalog, &cfg, now, None)?;
        println!(
            "recommendations for {}: {}",
            subject.id,
            serde_json::to_string_pretty(&recs)?
        );
    }

    println!("score-demo done");
    Ok(())
}
