//! Gate 2 reinforced: second opinion on the ambiguous band.

use std::time::Duration;

use metrics::counter;
use serde::Deserialize;

use super::classify::status_label;
use super::{ensure_metrics_described, excerpt};
use crate::atlas::{AtlasPacket, ProcessingStatus};
use crate::oracle::{ask_json, sanitize_line, DynOracle};

/// Updated score must be strictly above this for an ADMIT to stand.
pub const CONFIRM_ABOVE: u8 = 50;

#[derive(Debug, Clone, Deserialize)]
struct Verification {
    final_decision: String,
    #[serde(default)]
    reasoning: Option<String>,
    validity_score: i64,
}

pub struct Gate2Reinforced {
    verifier: DynOracle,
    timeout: Duration,
}

impl Gate2Reinforced {
    pub fn new(verifier: DynOracle, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    fn prompt(packet: &AtlasPacket) -> String {
        format!(
            r#"ACT AS: Senior Intelligence Analyst (Gate 2 Reinforced)
TASK: Verify this ambiguous OSINT packet.

CONTEXT:
The preliminary screener flagged this as "MAYBE" (Score: {score}).
It might be rumors, propaganda, or misidentified noise.

INPUT:
Title: {title}
Text: {text}
Source Tier: {tier}

INSTRUCTIONS:
1. Look for corroborating signals or obvious disqualifiers.
2. Assign a FINAL Binary Decision: ADMIT or DROP.
3. Assign a strictly updated score (>50 for ADMIT).

OUTPUT JSON ONLY:
{{"final_decision": "ADMIT" | "DROP", "reasoning": "STRING", "validity_score": INTEGER}}"#,
            score = packet.triage.validity_score,
            title = sanitize_line(&packet.payload.title, 300),
            text = sanitize_line(&excerpt(&packet.payload.raw_text, 1000), 1000),
            tier = packet.source.source_tier,
        )
    }

    /// Only PENDING_REINFORCED packets are touched; anything else passes
    /// through with no oracle call and no history entry.
    pub async fn process(&self, mut packet: AtlasPacket) -> AtlasPacket {
        if packet.status() != ProcessingStatus::PendingReinforced {
            return packet;
        }
        ensure_metrics_described();

        let answer = ask_json::<Verification>(
            self.verifier.as_ref(),
            &Self::prompt(&packet),
            self.timeout,
        )
        .await;

        let t = &mut packet.triage;
        match answer {
            Ok(v) => {
                let score = v.validity_score.clamp(0, 100) as u8;
                let admit = v.final_decision.trim().eq_ignore_ascii_case("ADMIT");
                t.validity_score = score;
                t.record(format!("GATE2_REINFORCED_SCORE:{score}"));
                t.record(format!(
                    "REASON:{}",
                    sanitize_line(v.reasoning.as_deref().unwrap_or("N/A"), 50)
                ));
                // decision and score must agree
                if admit && score > CONFIRM_ABOVE {
                    t.processing_status = ProcessingStatus::Clean;
                    t.record("GATE2_REINFORCED_ADMIT");
                } else {
                    t.processing_status = ProcessingStatus::Drop;
                    t.record("GATE2_REINFORCED_DROP");
                }
            }
            Err(e) => {
                tracing::warn!(target: "gate2r", error = %e, "verifier failed, dropping");
                t.processing_status = ProcessingStatus::Drop;
                t.record(format!(
                    "GATE2_REINFORCED_ERROR:{}",
                    sanitize_line(&e.to_string(), 120)
                ));
            }
        }

        counter!("gate2r_routed_total", "status" => status_label(packet.status())).increment(1);
        tracing::info!(
            target: "gate2r",
            id = %packet.short_id(),
            score = packet.triage.validity_score,
            status = ?packet.status(),
            "verified"
        );
        packet
    }
}
