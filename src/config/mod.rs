//! Runtime configuration: `config/sentinel.toml` (override with
//! `SENTINEL_CONFIG_PATH`) plus the oracle config in [`ai`].

pub mod ai;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::atlas::{IngestMethod, SourceTier};

pub const ENV_SENTINEL_CONFIG_PATH: &str = "SENTINEL_CONFIG_PATH";
pub const DEFAULT_SENTINEL_CONFIG_PATH: &str = "config/sentinel.toml";

const DEFAULT_FEED_URL: &str = "https://news.google.com/rss/search?q=Thailand+Cambodia+border+shelling+OR+artillery+OR+mortar+OR+drone+attack+OR+firefight+OR+explosion+OR+clash&hl=en-US&gl=US&ceid=US:en";

/// One news feed polled by the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "FeedConfig::default_tier")]
    pub tier: SourceTier,
    #[serde(default = "FeedConfig::default_method")]
    pub method: IngestMethod,
}

impl FeedConfig {
    fn default_tier() -> SourceTier {
        SourceTier::TrustedMedia
    }
    fn default_method() -> IngestMethod {
        IngestMethod::Feed
    }
}

/// Links injected into every SITREP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceLinks {
    #[serde(default)]
    pub system_url: Option<String>,
    #[serde(default)]
    pub donate_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub default_country: String,
    pub postal_table: PathBuf,
    pub zones_dir: PathBuf,
    pub analyst_prompt: PathBuf,
    /// Directory for the JSON sector store; `None` keeps documents in memory.
    pub store_dir: Option<PathBuf>,
    pub max_items_per_cycle: usize,
    pub max_item_age_hours: i64,
    pub status_ttl_secs: i64,
    pub feeds: Vec<FeedConfig>,
    pub links: ServiceLinks,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            default_country: "TH".to_string(),
            postal_table: PathBuf::from("config/postal_codes.json"),
            zones_dir: PathBuf::from("config/zones"),
            analyst_prompt: PathBuf::from("config/analyst_system_prompt.txt"),
            store_dir: None,
            max_items_per_cycle: 30,
            max_item_age_hours: 72,
            status_ttl_secs: 60,
            feeds: vec![FeedConfig {
                name: "Google News".to_string(),
                url: DEFAULT_FEED_URL.to_string(),
                tier: SourceTier::TrustedMedia,
                method: IngestMethod::Feed,
            }],
            links: ServiceLinks::default(),
        }
    }
}

impl SentinelConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sentinel config from {}", path.display()))?;
        let mut cfg: SentinelConfig = toml::from_str(&content)
            .with_context(|| format!("parsing sentinel config {}", path.display()))?;
        cfg.default_country = cfg.default_country.trim().to_ascii_uppercase();
        if cfg.max_items_per_cycle == 0 {
            cfg.max_items_per_cycle = Self::default().max_items_per_cycle;
        }
        Ok(cfg)
    }

    /// 1) `$SENTINEL_CONFIG_PATH` (must exist)
    /// 2) `config/sentinel.toml`
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SENTINEL_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                anyhow::bail!("{ENV_SENTINEL_CONFIG_PATH} points to non-existent path");
            }
            return Self::load_from(&pb);
        }
        let p = PathBuf::from(DEFAULT_SENTINEL_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sentinel.toml");
        fs::write(
            &p,
            r#"
default_country = " kh "
max_items_per_cycle = 0

[[feeds]]
name = "Ministry"
url = "https://example.test/rss"
tier = 1
method = "API"
"#,
        )
        .unwrap();
        let cfg = SentinelConfig::load_from(&p).unwrap();
        assert_eq!(cfg.default_country, "KH");
        assert_eq!(cfg.max_items_per_cycle, 30);
        assert_eq!(cfg.status_ttl_secs, 60);
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].tier, SourceTier::Official);
        assert_eq!(cfg.feeds[0].method, IngestMethod::Api);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_must_exist() {
        env::set_var(ENV_SENTINEL_CONFIG_PATH, "/definitely/not/here.toml");
        assert!(SentinelConfig::load_default().is_err());
        env::remove_var(ENV_SENTINEL_CONFIG_PATH);
    }
}
