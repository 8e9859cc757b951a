//! Sentinel Atlas: binary entrypoint.
//! Boots the Axum HTTP server with the mission dispatcher, gating pipeline
//! and Prometheus endpoint.

use sentinel_atlas::api::{self, AppState};
use sentinel_atlas::config::{ai::OracleConfig, SentinelConfig};
use sentinel_atlas::metrics::Metrics;
use sentinel_atlas::oracle::OracleSet;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; JSON lines when `SENTINEL_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("gate1=info,gate2=info,gate2r=info,pipeline=info,mission=info,dispatch=info,compliance=info,warn")
    });
    let json = std::env::var("SENTINEL_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    // shuttle may already have installed a subscriber
    if res.is_err() {
        tracing::debug!("tracing subscriber already set");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = SentinelConfig::load_default()?;
    let oracle_cfg = OracleConfig::load_default()?;
    let oracles = OracleSet::from_config(&oracle_cfg);
    tracing::info!(
        target: "dispatch",
        provider = %oracle_cfg.provider,
        enabled = oracle_cfg.enabled,
        feeds = cfg.feeds.len(),
        country = %cfg.default_country,
        "sentinel atlas starting"
    );

    let state = AppState::from_config(&cfg, &oracles)?;
    let mut router = api::router(state);
    match Metrics::init(cfg.max_items_per_cycle) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = ?e, "metrics endpoint disabled"),
    }

    Ok(router.into())
}
