// src/ingest/types.rs
use anyhow::Result;

use crate::atlas::{IngestMethod, SourceTier};

/// A candidate news item as fetched, before any gate has looked at it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub summary: Option<String>,
    /// Unix seconds claimed by the source.
    #[serde(default)]
    pub published_at: Option<i64>,
    pub source: String,
    pub tier: SourceTier,
    pub method: IngestMethod,
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>>;
    fn name(&self) -> &str;
}
