//! Oracle adapter: provider abstraction + JSON contract + daily budget.
//!
//! Every oracle (relevance, classifier, reinforced verifier, analyst,
//! translator) speaks the same contract: a prompt goes in, text comes out, and
//! the text must parse as JSON once surrounding code fences are stripped.
//! Anything else is an `OracleError` and each caller decides whether that
//! fails open or closed.

pub mod mock;
pub mod providers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::ai::{OracleConfig, OracleRole};
use crate::oracle::mock::ScriptedOracle;
use crate::oracle::providers::{GeminiProvider, OpenAiProvider};

/// Why an oracle call produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle disabled")]
    Disabled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("empty response")]
    Empty,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("daily budget of {0} calls exhausted")]
    BudgetExhausted(u32),
}

/// Low-level text completion. Gates never see raw text; they go through
/// [`ask_json`].
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn OracleClient>;

/// Remove ```json fences and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    static RE_FENCE: OnceCell<Regex> = OnceCell::new();
    let re = RE_FENCE.get_or_init(|| Regex::new(r"```(?:json|JSON)?").expect("fence regex"));
    re.replace_all(raw, "").trim().to_string()
}

/// Strictly parse a completion into `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(OracleError::Empty);
    }
    serde_json::from_str(&cleaned).map_err(|e| OracleError::Malformed(e.to_string()))
}

/// Call the oracle with a hard timeout and parse its JSON answer.
pub async fn ask_json<T: DeserializeOwned>(
    client: &dyn OracleClient,
    prompt: &str,
    timeout: Duration,
) -> Result<T, OracleError> {
    let outcome = match tokio::time::timeout(timeout, client.complete(prompt)).await {
        Ok(Ok(text)) => parse_json(&text),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(OracleError::Timeout(timeout)),
    };
    if let Err(e) = &outcome {
        counter!("oracle_errors_total", "provider" => client.provider_name()).increment(1);
        tracing::debug!(target: "oracle", provider = client.provider_name(), error = %e, "oracle call failed");
    }
    outcome
}

/// Always fails with `Disabled`; used when the oracle is switched off.
pub struct DisabledClient;

#[async_trait]
impl OracleClient for DisabledClient {
    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        Err(OracleError::Disabled)
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

// ------------------------------------------------------------
// Daily budget wrapper
// ------------------------------------------------------------

/// Caps real provider calls per UTC day. Failed calls still count: they cost
/// quota on the provider side too.
pub struct BudgetedClient<C: OracleClient> {
    inner: C,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

#[derive(Debug, Clone)]
struct DailyCounter {
    day: chrono::NaiveDate,
    count: u32,
}

impl<C: OracleClient> BudgetedClient<C> {
    pub fn new(inner: C, daily_limit: u32) -> Self {
        Self {
            inner,
            daily_limit,
            counter: Mutex::new(DailyCounter {
                day: chrono::Utc::now().date_naive(),
                count: 0,
            }),
        }
    }

    fn try_spend(&self) -> Result<(), OracleError> {
        let today = chrono::Utc::now().date_naive();
        let mut g = match self.counter.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        if g.day != today {
            g.day = today;
            g.count = 0;
        }
        if g.count >= self.daily_limit {
            return Err(OracleError::BudgetExhausted(self.daily_limit));
        }
        g.count = g.count.saturating_add(1);
        Ok(())
    }
}

#[async_trait]
impl<C: OracleClient> OracleClient for BudgetedClient<C> {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.try_spend()?;
        self.inner.complete(prompt).await
    }
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

// ------------------------------------------------------------
// Factory
// ------------------------------------------------------------

/// One client per pipeline role.
#[derive(Clone)]
pub struct OracleSet {
    pub relevance: Option<DynOracle>,
    pub classifier: DynOracle,
    pub reinforced: DynOracle,
    pub analyst: DynOracle,
    pub translator: DynOracle,
    pub timeout: Duration,
}

impl OracleSet {
    /// Build clients according to config and environment.
    ///
    /// * `AI_TEST_MODE=mock` → deterministic scripted oracles per role.
    /// * `enabled == false` → disabled clients (gates fail per their policy).
    /// * otherwise the configured provider, wrapped in a daily budget.
    pub fn from_config(cfg: &OracleConfig) -> Self {
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));

        if std::env::var("AI_TEST_MODE")
            .map(|v| v == "mock")
            .unwrap_or(false)
        {
            return Self {
                relevance: Some(Arc::new(ScriptedOracle::fixed(mock::MOCK_RELEVANCE))),
                classifier: Arc::new(ScriptedOracle::fixed(mock::MOCK_CLASSIFICATION)),
                reinforced: Arc::new(ScriptedOracle::fixed(mock::MOCK_REINFORCED)),
                analyst: Arc::new(ScriptedOracle::fixed(mock::MOCK_SITREP)),
                translator: Arc::new(ScriptedOracle::fixed(mock::MOCK_SITREP)),
                timeout,
            };
        }

        if !cfg.enabled {
            let off: DynOracle = Arc::new(DisabledClient);
            return Self {
                relevance: None,
                classifier: off.clone(),
                reinforced: off.clone(),
                analyst: off.clone(),
                translator: off,
                timeout,
            };
        }

        let build = |role: OracleRole| -> DynOracle {
            let model = cfg.model_for(role);
            match cfg.provider.as_str() {
                "gemini" => Arc::new(BudgetedClient::new(
                    GeminiProvider::new(&cfg.api_key, model, timeout),
                    cfg.daily_limit,
                )),
                "openai" => Arc::new(BudgetedClient::new(
                    OpenAiProvider::new(&cfg.api_key, model, timeout),
                    cfg.daily_limit,
                )),
                other => {
                    tracing::warn!(target: "oracle", provider = other, "unknown oracle provider, disabling");
                    Arc::new(DisabledClient)
                }
            }
        };

        Self {
            relevance: cfg.relevance_filter.then(|| build(OracleRole::Relevance)),
            classifier: build(OracleRole::Classifier),
            reinforced: build(OracleRole::Reinforced),
            analyst: build(OracleRole::Analyst),
            translator: build(OracleRole::Translator),
            timeout,
        }
    }
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Single line, collapsed whitespace, capped at `max` chars. Used for oracle
/// text that ends up in gate history.
pub fn sanitize_line(input: &str, max: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        ok: bool,
    }

    #[test]
    fn fences_are_stripped_before_parsing() {
        let raw = "```json\n{\"ok\": true}\n```";
        let p: Probe = parse_json(raw).unwrap();
        assert_eq!(p, Probe { ok: true });
    }

    #[test]
    fn prose_is_malformed() {
        let err = parse_json::<Probe>("Sure! Here is the JSON you asked for").unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
        assert_eq!(parse_json::<Probe>("```\n```").unwrap_err(), OracleError::Empty);
    }

    #[tokio::test]
    async fn budget_blocks_after_limit() {
        let client = BudgetedClient::new(ScriptedOracle::fixed(r#"{"ok":true}"#), 2);
        assert!(client.complete("a").await.is_ok());
        assert!(client.complete("b").await.is_ok());
        assert_eq!(
            client.complete("c").await.unwrap_err(),
            OracleError::BudgetExhausted(2)
        );
    }

    #[tokio::test]
    async fn timeout_maps_to_oracle_error() {
        let slow = ScriptedOracle::fixed(r#"{"ok":true}"#).with_delay(Duration::from_millis(200));
        let err = ask_json::<Probe>(&slow, "p", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
    }

    #[test]
    fn sanitize_line_collapses_and_caps() {
        assert_eq!(sanitize_line("a\n  b\tc", 10), "a b c");
        assert_eq!(sanitize_line("abcdef", 3), "abc");
    }
}
