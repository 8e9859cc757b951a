// src/pipeline.rs
//! Drives raw items through Gate 1 → Gate 2 base → Gate 2 reinforced,
//! persists CLEAN packets and renders the analyst digest.

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::atlas::{AtlasPacket, ProcessingStatus};
use crate::gates::{Gate1Ingest, Gate2Base, Gate2Reinforced, IngestVerdict};
use crate::ingest::{self, types::NewsSource, types::RawItem};
use crate::oracle::OracleSet;
use crate::store::PacketStore;

pub const EMPTY_DIGEST: &str = "No recent kinetic reports.";
/// Most packets the analyst digest will carry.
pub const DIGEST_MAX_LINES: usize = 30;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline batches processed.");
        describe_counter!("pipeline_clean_total", "Packets persisted as CLEAN.");
        describe_counter!(
            "pipeline_persist_errors_total",
            "CLEAN packets that failed to persist."
        );
        describe_gauge!("pipeline_last_cycle_ts", "Unix ts of the last feed cycle.");
    });
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub fetched: usize,
    pub stale: usize,
    pub provider_errors: usize,
    pub duplicates: usize,
    pub irrelevant: usize,
    pub store_errors: usize,
    pub admitted: usize,
    pub sent_to_review: usize,
    pub clean: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub clean: Vec<AtlasPacket>,
    pub stats: PipelineStats,
    pub digest: String,
}

/// One line per CLEAN packet; packets that never reached CLEAN are ignored.
pub fn build_digest(packets: &[AtlasPacket]) -> String {
    let lines: Vec<String> = packets
        .iter()
        .filter(|p| p.status() == ProcessingStatus::Clean)
        .take(DIGEST_MAX_LINES)
        .map(|p| {
            format!(
                "[ID: {}] {} (score {}, {})",
                p.short_id(),
                p.payload.title,
                p.triage.validity_score,
                p.triage.risk_domain.as_str()
            )
        })
        .collect();
    if lines.is_empty() {
        EMPTY_DIGEST.to_string()
    } else {
        lines.join("\n")
    }
}

pub struct PipelineOrchestrator {
    gate1: Gate1Ingest,
    gate2: Gate2Base,
    gate2r: Gate2Reinforced,
    store: Arc<dyn PacketStore>,
    max_items: usize,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<dyn PacketStore>, oracles: &OracleSet, max_items: usize) -> Self {
        Self {
            gate1: Gate1Ingest::new(store.clone(), oracles.relevance.clone(), oracles.timeout),
            gate2: Gate2Base::new(oracles.classifier.clone(), oracles.timeout),
            gate2r: Gate2Reinforced::new(oracles.reinforced.clone(), oracles.timeout),
            store,
            max_items: max_items.max(1),
        }
    }

    /// Process at most `max_items` raw items, sequentially. One item's
    /// failure never stops the batch.
    pub async fn run_batch(&self, items: &[RawItem], now: i64) -> PipelineReport {
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);

        let mut stats = PipelineStats {
            fetched: items.len(),
            ..PipelineStats::default()
        };
        let mut clean = Vec::new();

        for item in items.iter().take(self.max_items) {
            let packet = match self.gate1.process(item, now).await {
                IngestVerdict::Admitted(p) => *p,
                IngestVerdict::Duplicate => {
                    stats.duplicates += 1;
                    continue;
                }
                IngestVerdict::Irrelevant { .. } => {
                    stats.irrelevant += 1;
                    continue;
                }
                IngestVerdict::Failed { .. } => {
                    stats.store_errors += 1;
                    continue;
                }
            };
            stats.admitted += 1;

            let packet = self.gate2.process(packet).await;
            if packet.status() == ProcessingStatus::PendingReinforced {
                stats.sent_to_review += 1;
            }
            let packet = self.gate2r.process(packet).await;

            match packet.status() {
                ProcessingStatus::Clean => match self.store.upsert_clean(&packet).await {
                    Ok(()) => {
                        counter!("pipeline_clean_total").increment(1);
                        clean.push(packet);
                    }
                    Err(e) => {
                        counter!("pipeline_persist_errors_total").increment(1);
                        tracing::warn!(target: "pipeline", id = %packet.short_id(), error = ?e, "clean store write failed");
                        stats.store_errors += 1;
                    }
                },
                _ => stats.dropped += 1,
            }
        }
        stats.clean = clean.len();

        tracing::info!(
            target: "pipeline",
            fetched = stats.fetched,
            admitted = stats.admitted,
            review = stats.sent_to_review,
            clean = stats.clean,
            dropped = stats.dropped,
            duplicates = stats.duplicates,
            "batch complete"
        );
        let digest = build_digest(&clean);
        PipelineReport {
            clean,
            stats,
            digest,
        }
    }

    /// Poll feeds, then run the batch.
    pub async fn run_cycle(
        &self,
        providers: &[Box<dyn NewsSource>],
        now: i64,
        max_age_secs: i64,
    ) -> PipelineReport {
        let batch = ingest::run_once(providers, now, max_age_secs, self.max_items).await;
        let mut report = self.run_batch(&batch.items, now).await;
        report.stats.stale = batch.stale;
        report.stats.provider_errors = batch.provider_errors;
        gauge!("pipeline_last_cycle_ts").set(now as f64);
        report
    }

    /// Digest over every CLEAN packet ingested within `max_age_secs`,
    /// newest first. This is what the analyst sees as current intelligence.
    pub async fn recent_digest(&self, now: i64, max_age_secs: i64) -> String {
        match self.store.clean_packets().await {
            Ok(mut packets) => {
                packets.retain(|p| {
                    let ts = p
                        .identity
                        .source_published_at
                        .unwrap_or(p.identity.ingest_timestamp);
                    now.saturating_sub(ts) <= max_age_secs
                });
                packets.sort_by_key(|p| std::cmp::Reverse(p.identity.ingest_timestamp));
                build_digest(&packets)
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", error = ?e, "clean store unreadable, empty digest");
                EMPTY_DIGEST.to_string()
            }
        }
    }
}
