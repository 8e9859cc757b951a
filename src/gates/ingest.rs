//! Gate 1: normalize, dedup, relevance.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};

use super::{ensure_metrics_described, excerpt, log_title};
use crate::atlas::{
    fingerprint, AtlasPacket, Identity, Payload, SourceContext, SourceTier, Triage,
};
use crate::ingest::types::RawItem;
use crate::oracle::{ask_json, sanitize_line, DynOracle, OracleError};
use crate::store::PacketStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
    Alarming,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Alarming => "ALARMING",
        }
    }
}

/// Relevance oracle answer. `is_relevant` and `sentiment` are required;
/// a reply without them is malformed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelevanceVerdict {
    pub is_relevant: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl RelevanceVerdict {
    /// Policy when the oracle could not answer: trust tier 1, drop the rest.
    pub fn fallback(tier: SourceTier) -> Self {
        Self {
            is_relevant: tier.is_most_trusted(),
            rejection_reason: (!tier.is_most_trusted()).then(|| "oracle error".to_string()),
            sentiment: Sentiment::Neutral,
            keywords: Vec::new(),
            language: default_language(),
        }
    }

    fn admitted_without_oracle() -> Self {
        Self {
            is_relevant: true,
            rejection_reason: None,
            sentiment: Sentiment::Neutral,
            keywords: Vec::new(),
            language: default_language(),
        }
    }
}

/// What Gate 1 did with one raw item. Only `Admitted` carries a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestVerdict {
    Admitted(Box<AtlasPacket>),
    Duplicate,
    Irrelevant { reason: String },
    /// Store trouble; the item is dropped and retried on a later cycle.
    Failed { reason: String },
}

impl IngestVerdict {
    pub fn into_packet(self) -> Option<AtlasPacket> {
        match self {
            IngestVerdict::Admitted(p) => Some(*p),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            IngestVerdict::Admitted(_) => "admitted",
            IngestVerdict::Duplicate => "duplicate",
            IngestVerdict::Irrelevant { .. } => "irrelevant",
            IngestVerdict::Failed { .. } => "store_error",
        }
    }
}

pub struct Gate1Ingest {
    store: Arc<dyn PacketStore>,
    relevance: Option<DynOracle>,
    timeout: Duration,
}

impl Gate1Ingest {
    /// `relevance = None` admits every non-duplicate.
    pub fn new(store: Arc<dyn PacketStore>, relevance: Option<DynOracle>, timeout: Duration) -> Self {
        Self {
            store,
            relevance,
            timeout,
        }
    }

    fn prompt(item: &RawItem) -> String {
        format!(
            r#"ACT AS: OSINT intake screener for a border conflict monitor.
TASK: Decide whether this item reports on armed conflict, security incidents or
civil-protection matters relevant to the monitored region.

INPUT:
Title: {title}
Summary: {summary}
Source Tier: {tier} (1 = official, 5 = anonymous)

OUTPUT JSON ONLY:
{{
  "is_relevant": true | false,
  "rejection_reason": "STRING or null",
  "sentiment": "POSITIVE" | "NEGATIVE" | "NEUTRAL" | "ALARMING",
  "keywords": ["max", "three", "keywords"],
  "language": "ISO 639-1 code"
}}"#,
            title = sanitize_line(&item.title, 300),
            summary = sanitize_line(&excerpt(item.summary.as_deref().unwrap_or(""), 500), 500),
            tier = item.tier,
        )
    }

    async fn ask_relevance(&self, item: &RawItem) -> (RelevanceVerdict, bool) {
        let Some(oracle) = &self.relevance else {
            return (RelevanceVerdict::admitted_without_oracle(), false);
        };
        let answer: Result<RelevanceVerdict, OracleError> =
            ask_json(oracle.as_ref(), &Self::prompt(item), self.timeout).await;
        match answer {
            Ok(mut v) => {
                v.keywords.truncate(3);
                (v, false)
            }
            Err(e) => {
                tracing::warn!(
                    target: "gate1",
                    error = %e,
                    tier = item.tier.rank(),
                    title = %log_title(&item.title),
                    "relevance oracle failed, applying tier policy"
                );
                (RelevanceVerdict::fallback(item.tier), true)
            }
        }
    }

    /// Run one raw item through Gate 1. `now` is unix seconds.
    pub async fn process(&self, item: &RawItem, now: i64) -> IngestVerdict {
        ensure_metrics_described();
        let verdict = self.process_inner(item, now).await;
        match &verdict {
            IngestVerdict::Admitted(_) => counter!("gate1_admitted_total").increment(1),
            other => counter!("gate1_dropped_total", "reason" => other.label()).increment(1),
        }
        verdict
    }

    async fn process_inner(&self, item: &RawItem, now: i64) -> IngestVerdict {
        let url = item.link.trim();
        let fp = fingerprint(&item.title, url);

        // dedup before any oracle spend
        match self.store.has_fingerprint(&fp).await {
            Ok(true) => {
                tracing::debug!(target: "gate1", title = %log_title(&item.title), "duplicate dropped");
                return IngestVerdict::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(target: "gate1", error = ?e, "dedup lookup failed, dropping item");
                return IngestVerdict::Failed {
                    reason: format!("dedup lookup: {e}"),
                };
            }
        }

        let (relevance, fell_back) = self.ask_relevance(item).await;
        if !relevance.is_relevant {
            let reason = relevance
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "not relevant".to_string());
            tracing::debug!(target: "gate1", %reason, title = %log_title(&item.title), "irrelevant dropped");
            return IngestVerdict::Irrelevant { reason };
        }

        let mut triage = Triage::default();
        let mut entry = format!(
            "GATE1_PASS|TIER:{}|SENTIMENT:{}|KEYWORDS:{}",
            item.tier,
            relevance.sentiment.as_str(),
            relevance
                .keywords
                .iter()
                .map(|k| sanitize_line(k, 32))
                .collect::<Vec<_>>()
                .join(",")
        );
        if fell_back {
            entry.push_str("|ORACLE_FALLBACK");
        }
        triage.record(entry);

        let packet = AtlasPacket {
            identity: Identity {
                artifact_id: uuid::Uuid::new_v4().to_string(),
                fingerprint: fp.clone(),
                canonical_url: url.to_string(),
                ingest_timestamp: now,
                source_published_at: item.published_at,
            },
            source: SourceContext {
                source_id: item.source.clone(),
                source_tier: item.tier,
                ingest_method: item.method,
            },
            payload: Payload {
                title: item.title.trim().to_string(),
                raw_text: item
                    .summary
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| item.title.clone()),
                language_code: relevance.language.trim().to_ascii_lowercase(),
                is_translated: false,
            },
            triage,
        };

        if let Err(e) = self.store.insert_raw(&packet).await {
            tracing::warn!(target: "gate1", error = ?e, "raw store write failed, dropping packet");
            return IngestVerdict::Failed {
                reason: format!("raw store: {e}"),
            };
        }
        if let Err(e) = self.store.record_fingerprint(&fp, url).await {
            tracing::warn!(target: "gate1", error = ?e, "dedup index write failed, dropping packet");
            return IngestVerdict::Failed {
                reason: format!("dedup index: {e}"),
            };
        }

        tracing::info!(
            target: "gate1",
            id = %packet.short_id(),
            tier = item.tier.rank(),
            sentiment = relevance.sentiment.as_str(),
            "admitted"
        );
        IngestVerdict::Admitted(Box::new(packet))
    }
}
