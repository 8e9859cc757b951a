//! Runs one gating cycle and prints what reached CLEAN.
//!
//! `atlas-probe [fixture.xml]` reads an RSS file instead of the configured
//! feeds. Set `AI_TEST_MODE=mock` to run without provider keys. A second
//! pass over the same items shows the dedup index at work.

use std::sync::Arc;

use chrono::Utc;
use sentinel_atlas::atlas::SourceTier;
use sentinel_atlas::config::{ai::OracleConfig, SentinelConfig};
use sentinel_atlas::ingest::providers::{self, RssFeedProvider};
use sentinel_atlas::ingest::types::NewsSource;
use sentinel_atlas::oracle::OracleSet;
use sentinel_atlas::pipeline::PipelineOrchestrator;
use sentinel_atlas::store::MemoryPacketStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(true).init();

    let cfg = SentinelConfig::load_default()?;
    let oracles = OracleSet::from_config(&OracleConfig::load_default()?);

    let feeds: Vec<Box<dyn NewsSource>> = match std::env::args().nth(1) {
        Some(path) => {
            let xml = std::fs::read_to_string(&path)?;
            vec![Box::new(RssFeedProvider::from_fixture(
                "fixture",
                SourceTier::TrustedMedia,
                &xml,
            ))]
        }
        None => providers::from_feeds(&cfg.feeds),
    };

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(MemoryPacketStore::new()),
        &oracles,
        cfg.max_items_per_cycle,
    );
    let max_age = cfg.max_item_age_hours.saturating_mul(3600);

    let first = orchestrator
        .run_cycle(&feeds, Utc::now().timestamp(), max_age)
        .await;
    println!("pass 1: {}", serde_json::to_string_pretty(&first.stats)?);
    println!("{}", first.digest);

    let second = orchestrator
        .run_cycle(&feeds, Utc::now().timestamp(), max_age)
        .await;
    println!(
        "pass 2: {} duplicates, {} clean",
        second.stats.duplicates, second.stats.clean
    );

    println!("atlas-probe done");
    Ok(())
}
