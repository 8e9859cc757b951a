//! Scripted oracle for tests and `AI_TEST_MODE=mock`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{OracleClient, OracleError};

pub const MOCK_RELEVANCE: &str = r#"{"is_relevant": true, "rejection_reason": null, "sentiment": "NEUTRAL", "keywords": ["border"], "language": "en"}"#;
pub const MOCK_CLASSIFICATION: &str =
    r#"{"risk_domain": "KINETIC", "target_region": "SE_ASIA", "validity_score": 72}"#;
pub const MOCK_REINFORCED: &str =
    r#"{"final_decision": "ADMIT", "reasoning": "mock corroboration", "validity_score": 60}"#;
pub const MOCK_SITREP: &str = r#"{
  "defcon_status": 4,
  "sitrep_entries": [{"topic": "Border", "summary": "No kinetic activity reported near the sector."}],
  "tactical_map": {"roads_to_avoid": [], "danger_zones": []},
  "predictive_analysis": {"forecast_defcon": 4, "confidence_score": 40, "threat_vector": "Static", "forecast_bullets": ["Quiet next 24h"]},
  "evacuation_point": {"name": "Provincial Hall", "lat": 13.75, "lon": 100.5, "reason": "Hardened structure"},
  "tactical_overlays": []
}"#;

/// Replays queued responses in order, then repeats the fallback forever.
pub struct ScriptedOracle {
    queue: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: Result<String, OracleError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    /// Always answers `text`.
    pub fn fixed(text: &str) -> Self {
        Self::new(Vec::new(), Ok(text.to_string()))
    }

    /// Always fails with `err`.
    pub fn failing(err: OracleError) -> Self {
        Self::new(Vec::new(), Err(err))
    }

    pub fn new(
        script: Vec<Result<String, OracleError>>,
        fallback: Result<String, OracleError>,
    ) -> Self {
        Self {
            queue: Mutex::new(script.into()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OracleClient for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
