//! Triage gates. Each gate converts oracle failures into a routing decision
//! at its own boundary; nothing past a gate ever sees an `OracleError`.
//!
//! | gate | on oracle failure |
//! |------|-------------------|
//! | 1 (relevance) | tier 1 admitted, everyone else dropped |
//! | 2 base | DROP |
//! | 2 reinforced | DROP |

pub mod classify;
pub mod ingest;
pub mod reinforced;

pub use classify::{route_score, Gate2Base};
pub use ingest::{Gate1Ingest, IngestVerdict, RelevanceVerdict, Sentiment};
pub use reinforced::Gate2Reinforced;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("gate1_admitted_total", "Items admitted by Gate 1.");
        describe_counter!(
            "gate1_dropped_total",
            "Items dropped by Gate 1, labelled by reason."
        );
        describe_counter!(
            "gate2_routed_total",
            "Gate 2 base routing outcomes, labelled by status."
        );
        describe_counter!(
            "gate2r_routed_total",
            "Gate 2 reinforced outcomes, labelled by status."
        );
        describe_histogram!("gate2_validity_score", "Validity scores assigned at Gate 2.");
    });
}

/// First `max` chars of `s`; used for prompt excerpts.
pub(crate) fn excerpt(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Titles only ever reach logs truncated.
pub(crate) fn log_title(title: &str) -> String {
    excerpt(title, 60)
}
