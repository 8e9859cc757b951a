//! Gate 2 base: classify, score and route.

use std::time::Duration;

use metrics::{counter, histogram};
use serde::Deserialize;

use super::{ensure_metrics_described, excerpt, log_title};
use crate::atlas::{AtlasPacket, ProcessingStatus, RiskDomain};
use crate::oracle::{ask_json, sanitize_line, DynOracle};

/// Scores strictly above this are admitted outright.
pub const ADMIT_ABOVE: u8 = 66;
/// Scores at or above this (and not above `ADMIT_ABOVE`) go to reinforced review.
pub const REVIEW_FROM: u8 = 33;

#[derive(Debug, Clone, Deserialize)]
struct Classification {
    #[serde(default)]
    risk_domain: Option<String>,
    #[serde(default)]
    target_region: Option<String>,
    validity_score: i64,
}

/// Score band routing: `> 66` CLEAN, `33..=66` PENDING_REINFORCED, `< 33` DROP.
pub fn route_score(score: u8) -> ProcessingStatus {
    if score > ADMIT_ABOVE {
        ProcessingStatus::Clean
    } else if score >= REVIEW_FROM {
        ProcessingStatus::PendingReinforced
    } else {
        ProcessingStatus::Drop
    }
}

fn route_label(status: ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Clean => "GATE2_BASE_ADMIT",
        ProcessingStatus::PendingReinforced => "GATE2_BASE_MAYBE",
        _ => "GATE2_BASE_DROP",
    }
}

pub struct Gate2Base {
    classifier: DynOracle,
    timeout: Duration,
}

impl Gate2Base {
    pub fn new(classifier: DynOracle, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    fn prompt(packet: &AtlasPacket) -> String {
        format!(
            r#"ACT AS: Intelligence Officer (Gate 2 Screener)
TASK: Analyze this raw OSINT packet.

INPUT:
Title: {title}
Text: {text}
Source Tier: {tier}

REQUIREMENTS:
1. Classify Risk Domain (KINETIC, POLITICAL, INFRASTRUCTURE, LOGISTICS, CIVIL_UNREST, NOISE).
2. Identify Broad Target Region (e.g. SE_ASIA, EAST_EUROPE).
3. Score Validity (0-100).
   - 100 = Confirmed by Trusted Source (Tier 1).
   - 50 = Plausible but needs verification.
   - 0 = Irrelevant / Spam / Ad.

OUTPUT JSON ONLY:
{{"risk_domain": "ENUM_VALUE", "target_region": "STRING", "validity_score": INTEGER}}"#,
            title = sanitize_line(&packet.payload.title, 300),
            text = sanitize_line(&excerpt(&packet.payload.raw_text, 500), 500),
            tier = packet.source.source_tier,
        )
    }

    /// Classify a RAW packet. Any other status is returned untouched.
    /// Oracle failure routes to DROP.
    pub async fn process(&self, mut packet: AtlasPacket) -> AtlasPacket {
        ensure_metrics_described();
        if packet.status() != ProcessingStatus::Raw {
            tracing::warn!(target: "gate2", id = %packet.short_id(), status = ?packet.status(), "not RAW, skipping");
            return packet;
        }

        let answer = ask_json::<Classification>(
            self.classifier.as_ref(),
            &Self::prompt(&packet),
            self.timeout,
        )
        .await;

        match answer {
            Ok(c) => {
                let score = c.validity_score.clamp(0, 100) as u8;
                let status = route_score(score);
                let t = &mut packet.triage;
                t.validity_score = score;
                t.risk_domain = c
                    .risk_domain
                    .as_deref()
                    .map(RiskDomain::from_label)
                    .unwrap_or(RiskDomain::Unclassified);
                t.target_region = c
                    .target_region
                    .map(|r| sanitize_line(&r, 64))
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "UNKNOWN".to_string());
                t.record(format!("GATE2_BASE_SCORE:{score}"));
                t.record(route_label(status));
                t.processing_status = status;
                histogram!("gate2_validity_score").record(f64::from(score));
            }
            Err(e) => {
                tracing::warn!(
                    target: "gate2",
                    id = %packet.short_id(),
                    title = %log_title(&packet.payload.title),
                    error = %e,
                    "classifier failed, dropping"
                );
                packet.triage.processing_status = ProcessingStatus::Drop;
                packet
                    .triage
                    .record(format!("GATE2_BASE_ERROR:{}", sanitize_line(&e.to_string(), 120)));
            }
        }

        counter!("gate2_routed_total", "status" => status_label(packet.status())).increment(1);
        tracing::info!(
            target: "gate2",
            id = %packet.short_id(),
            score = packet.triage.validity_score,
            domain = packet.triage.risk_domain.as_str(),
            status = ?packet.status(),
            "routed"
        );
        packet
    }
}

pub(crate) fn status_label(s: ProcessingStatus) -> &'static str {
    match s {
        ProcessingStatus::Raw => "raw",
        ProcessingStatus::PendingReinforced => "pending_reinforced",
        ProcessingStatus::Clean => "clean",
        ProcessingStatus::Drop => "drop",
    }
}
