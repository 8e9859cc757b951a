//! Mission dispatcher: decides per (zip, country, lang) request what to serve
//! and which background work to start. Never blocks on an oracle.
//!
//! Cache key is the exact zip code. Freshness follows a DEFCON-adaptive
//! table: the worse the sector, the sooner it is regenerated. At most one
//! generation runs per zip and at most one translation per zip+language.

pub mod mission;
pub mod status;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashSet;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::compliance::ComplianceEngine;
use crate::config::{ServiceLinks, SentinelConfig};
use crate::geo::GeoZoneIndex;
use crate::ingest::providers;
use crate::ingest::types::NewsSource;
use crate::oracle::{DynOracle, OracleSet};
use crate::pipeline::{PipelineOrchestrator, PipelineReport};
use crate::sitrep::{CertifyAction, LanguageSitrep, SectorIntelDocument, MASTER_LANG};
use crate::store::{JsonFileSectorStore, MemoryPacketStore, MemorySectorStore, SectorStore};

pub use status::{Stage, StatusBoard, StatusSnapshot};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "dispatch_outcomes_total",
            "Intel requests by outcome (hit, started, in_flight, error)."
        );
        describe_counter!("mission_generations_total", "Generation tasks by result.");
        describe_counter!("mission_translations_total", "Translation tasks by result.");
    });
}

// ------------------------------------------------------------
// Staleness
// ------------------------------------------------------------

/// Max document age per DEFCON level (index 0 = DEFCON 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    limits: [Duration; 5],
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            limits: [
                Duration::minutes(30),
                Duration::hours(4),
                Duration::hours(12),
                Duration::hours(24),
                Duration::hours(48),
            ],
        }
    }
}

impl StalenessPolicy {
    pub fn max_age(&self, defcon: u8) -> Duration {
        let idx = usize::from(defcon.clamp(1, 5)) - 1;
        self.limits[idx]
    }

    /// No timestamp (or an unreadable one) counts as stale.
    pub fn is_stale(&self, doc: &SectorIntelDocument, now: DateTime<Utc>) -> bool {
        match doc.generated_at() {
            Some(ts) => now - ts > self.max_age(doc.defcon()),
            None => true,
        }
    }
}

// ------------------------------------------------------------
// Single-flight markers
// ------------------------------------------------------------

/// Keys currently being worked on. `try_acquire` is an atomic
/// test-and-insert; the returned guard removes the key when dropped,
/// including on panic.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    keys: Arc<DashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        self.keys.insert(key.to_string()).then(|| InFlightGuard {
            keys: self.keys.clone(),
            key: key.to_string(),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<DashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

pub(crate) fn translation_key(zip: &str, lang: &str) -> String {
    format!("{zip}#{lang}")
}

// ------------------------------------------------------------
// Request / response
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntelRequest {
    #[serde(alias = "zip")]
    pub zip_code: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

impl IntelRequest {
    pub fn new(zip_code: &str) -> Self {
        Self {
            zip_code: zip_code.to_string(),
            country: None,
            lang: None,
        }
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }
}

/// The only three shapes a caller ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IntelResponse {
    Success { data: Box<LanguageSitrep> },
    Calculating { message: String },
    Error { message: String },
}

impl IntelResponse {
    fn calculating(message: &str) -> Self {
        IntelResponse::Calculating {
            message: message.to_string(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        IntelResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_calculating(&self) -> bool {
        matches!(self, IntelResponse::Calculating { .. })
    }
}

/// Response plus the background task it started, if any. Dropping the
/// handle detaches the task.
#[derive(Debug)]
pub struct Dispatch {
    pub response: IntelResponse,
    pub task: Option<JoinHandle<()>>,
}

impl Dispatch {
    fn reply(response: IntelResponse) -> Self {
        Self {
            response,
            task: None,
        }
    }
}

/// Summary row of the HITL review queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReview {
    pub zip_code: String,
    pub country: String,
    pub defcon_status: u8,
    pub location_name: String,
    pub last_updated: String,
    pub summary: Vec<String>,
}

// ------------------------------------------------------------
// Context
// ------------------------------------------------------------

/// Everything a background mission needs, shared by `Arc`.
pub struct MissionContext {
    pub geo: Arc<GeoZoneIndex>,
    pub compliance: Arc<ComplianceEngine>,
    pub sectors: Arc<dyn SectorStore>,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub feeds: Vec<Box<dyn NewsSource>>,
    pub analyst: DynOracle,
    pub translator: DynOracle,
    pub timeout: StdDuration,
    pub prompt_template: String,
    pub links: ServiceLinks,
    pub max_item_age_secs: i64,
    pub in_flight: InFlightSet,
    pub status: Arc<StatusBoard>,
}

impl MissionContext {
    /// Wire the context from config: reference tables, stores, feeds, oracles.
    pub fn from_config(cfg: &SentinelConfig, oracles: &OracleSet) -> Result<Self> {
        let geo = GeoZoneIndex::load_from(&cfg.postal_table)
            .with_context(|| format!("loading postal table {}", cfg.postal_table.display()))?;
        tracing::info!(target: "dispatch", sectors = geo.len(), "postal table loaded");

        let sectors: Arc<dyn SectorStore> = match &cfg.store_dir {
            Some(dir) => Arc::new(JsonFileSectorStore::open(dir)?),
            None => Arc::new(MemorySectorStore::new()),
        };
        let pipeline = PipelineOrchestrator::new(
            Arc::new(MemoryPacketStore::new()),
            oracles,
            cfg.max_items_per_cycle,
        );

        Ok(Self {
            geo: Arc::new(geo),
            compliance: Arc::new(ComplianceEngine::new(&cfg.zones_dir)),
            sectors,
            pipeline: Arc::new(pipeline),
            feeds: providers::from_feeds(&cfg.feeds),
            analyst: oracles.analyst.clone(),
            translator: oracles.translator.clone(),
            timeout: oracles.timeout,
            prompt_template: load_prompt_template(&cfg.analyst_prompt),
            links: cfg.links.clone(),
            max_item_age_secs: cfg.max_item_age_hours.saturating_mul(3600),
            in_flight: InFlightSet::new(),
            status: Arc::new(StatusBoard::new(Duration::seconds(cfg.status_ttl_secs.max(1)))),
        })
    }
}

fn load_prompt_template(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => s,
        Ok(_) | Err(_) => {
            tracing::warn!(target: "dispatch", path = %path.display(), "analyst prompt missing, using built-in template");
            mission::DEFAULT_ANALYST_PROMPT.to_string()
        }
    }
}

// ------------------------------------------------------------
// Dispatcher
// ------------------------------------------------------------

pub struct MissionDispatcher {
    ctx: Arc<MissionContext>,
    staleness: StalenessPolicy,
    default_country: String,
}

impl MissionDispatcher {
    pub fn new(ctx: MissionContext, default_country: &str) -> Self {
        Self {
            ctx: Arc::new(ctx),
            staleness: StalenessPolicy::default(),
            default_country: default_country.trim().to_ascii_uppercase(),
        }
    }

    pub fn with_staleness(mut self, policy: StalenessPolicy) -> Self {
        self.staleness = policy;
        self
    }

    pub fn context(&self) -> &MissionContext {
        &self.ctx
    }

    pub fn status(&self) -> StatusSnapshot {
        self.ctx.status.snapshot(Utc::now())
    }

    /// Answer a request; background work (if any) keeps running detached.
    pub async fn handle_request(&self, req: IntelRequest) -> IntelResponse {
        self.dispatch(req).await.response
    }

    pub async fn dispatch(&self, req: IntelRequest) -> Dispatch {
        self.dispatch_at(req, Utc::now()).await
    }

    pub async fn dispatch_at(&self, req: IntelRequest, now: DateTime<Utc>) -> Dispatch {
        ensure_metrics_described();
        let out = self.decide(req, now).await;
        let outcome = match (&out.response, out.task.is_some()) {
            (IntelResponse::Success { .. }, _) => "hit",
            (IntelResponse::Error { .. }, _) => "error",
            (IntelResponse::Calculating { .. }, true) => "started",
            (IntelResponse::Calculating { .. }, false) => "in_flight",
        };
        counter!("dispatch_outcomes_total", "outcome" => outcome).increment(1);
        out
    }

    async fn decide(&self, req: IntelRequest, now: DateTime<Utc>) -> Dispatch {
        let zip = req.zip_code.trim().to_string();
        let Some(loc) = self.ctx.geo.resolve(&zip).cloned() else {
            tracing::info!(target: "dispatch", %zip, "unknown sector");
            return Dispatch::reply(IntelResponse::error("Unknown sector"));
        };
        let country = req
            .country
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.default_country.clone());
        let lang = match normalize_lang(req.lang.as_deref()) {
            Some(l) => l,
            None => return Dispatch::reply(IntelResponse::error("Unsupported language code")),
        };

        let existing = match self.ctx.sectors.get(&zip).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(target: "dispatch", %zip, error = ?e, "sector store read failed");
                return Dispatch::reply(IntelResponse::error("Sector store unavailable"));
            }
        };

        if let Some(doc) = existing.filter(|d| !self.staleness.is_stale(d, now)) {
            if let Some(sitrep) = doc.language(&lang) {
                let mut data = sitrep.without_citations();
                data.purge_reserved_overlays();
                tracing::debug!(target: "dispatch", %zip, %lang, "cache hit");
                return Dispatch::reply(IntelResponse::Success {
                    data: Box::new(data),
                });
            }
            if let (Some(master), Some(version)) = (doc.master().cloned(), doc.master_version()) {
                return self.start_translation(&zip, &lang, master, version);
            }
            tracing::warn!(target: "dispatch", %zip, "document without master, regenerating");
        }

        let Some(guard) = self.ctx.in_flight.try_acquire(&zip) else {
            tracing::debug!(target: "dispatch", %zip, "generation already in flight");
            return Dispatch::reply(IntelResponse::calculating("Mission in progress"));
        };
        tracing::info!(target: "dispatch", %zip, %country, %lang, "generation dispatched");
        let ctx = self.ctx.clone();
        let task = tokio::spawn(mission::run_generation(ctx, loc, country, lang, guard));
        Dispatch {
            response: IntelResponse::calculating("Analyst dispatched"),
            task: Some(task),
        }
    }

    fn start_translation(
        &self,
        zip: &str,
        lang: &str,
        master: LanguageSitrep,
        master_version: String,
    ) -> Dispatch {
        let Some(guard) = self.ctx.in_flight.try_acquire(&translation_key(zip, lang)) else {
            return Dispatch::reply(IntelResponse::calculating("Translation in progress"));
        };
        tracing::info!(target: "dispatch", %zip, %lang, "translation dispatched");
        let ctx = self.ctx.clone();
        let task = tokio::spawn(mission::run_translation(
            ctx,
            zip.to_string(),
            lang.to_string(),
            master,
            master_version,
            guard,
        ));
        Dispatch {
            response: IntelResponse::calculating("Translating intel"),
            task: Some(task),
        }
    }

    /// One pipeline cycle over the configured feeds.
    pub async fn run_pipeline_cycle(&self) -> PipelineReport {
        let now = Utc::now().timestamp();
        self.ctx
            .pipeline
            .run_cycle(&self.ctx.feeds, now, self.ctx.max_item_age_secs)
            .await
    }

    /// Sectors whose English rating waits for an operator.
    pub async fn pending_reviews(&self) -> Result<Vec<PendingReview>> {
        let docs = self.ctx.sectors.list().await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| {
                let m = d.master()?;
                m.is_pending_review().then(|| PendingReview {
                    zip_code: d.zip_code.clone(),
                    country: d.country.clone(),
                    defcon_status: m.defcon_status,
                    location_name: m.location_name.clone(),
                    last_updated: m.last_updated.clone(),
                    summary: m.summary.clone(),
                })
            })
            .collect())
    }

    /// Operator decision on a sector. `Ok(None)` when there is nothing to certify.
    pub async fn certify(&self, zip_code: &str, action: CertifyAction) -> Result<Option<LanguageSitrep>> {
        let zip = zip_code.trim();
        let Some(mut doc) = self.ctx.sectors.get(zip).await? else {
            return Ok(None);
        };
        if !doc.certify(action, Utc::now()) {
            return Ok(None);
        }
        let master = doc.master().cloned();
        self.ctx.sectors.replace(doc).await?;
        tracing::info!(target: "dispatch", zip, ?action, "sector certified by operator");
        Ok(master)
    }
}

/// Lowercased language tag; `None` when it cannot be a language code.
/// Any English variant (`en-US`, `en-gb`) is served from the master.
fn normalize_lang(lang: Option<&str>) -> Option<String> {
    let l = lang.map(str::trim).unwrap_or("");
    if l.is_empty() {
        return Some(MASTER_LANG.to_string());
    }
    let ok = l.len() <= 8 && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !ok {
        return None;
    }
    let l = l.to_ascii_lowercase();
    match l.split('-').next() {
        Some(primary) if primary == MASTER_LANG => Some(MASTER_LANG.to_string()),
        _ => Some(l),
    }
}
