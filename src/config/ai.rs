// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_daily_limit() -> u32 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

/// Pipeline role an oracle client serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleRole {
    Relevance,
    Classifier,
    Reinforced,
    Analyst,
    Translator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelNames {
    #[serde(default = "ModelNames::default_fast")]
    pub relevance: String,
    #[serde(default = "ModelNames::default_fast")]
    pub classifier: String,
    #[serde(default = "ModelNames::default_strong")]
    pub reinforced: String,
    #[serde(default = "ModelNames::default_strong")]
    pub analyst: String,
    #[serde(default = "ModelNames::default_fast")]
    pub translator: String,
}

impl ModelNames {
    fn default_fast() -> String {
        "gemini-2.5-flash-lite".to_string()
    }
    fn default_strong() -> String {
        "gemini-2.5-pro".to_string()
    }
}

impl Default for ModelNames {
    fn default() -> Self {
        Self {
            relevance: Self::default_fast(),
            classifier: Self::default_fast(),
            reinforced: Self::default_strong(),
            analyst: Self::default_strong(),
            translator: Self::default_fast(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub enabled: bool,
    /// "gemini" | "openai" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read from GEMINI_API_KEY / OPENAI_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ask the relevance oracle at Gate 1. When off, every non-duplicate is admitted.
    #[serde(default = "default_true")]
    pub relevance_filter: bool,
    #[serde(default)]
    pub models: ModelNames,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "gemini".to_string(),
            api_key: String::new(),
            daily_limit: default_daily_limit(),
            timeout_secs: default_timeout_secs(),
            relevance_filter: true,
            models: ModelNames::default(),
        }
    }
}

impl OracleConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: OracleConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "gemini" => env::var("GEMINI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing GEMINI_API_KEY env var"))?,
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = default_timeout_secs();
        }

        Ok(cfg)
    }

    /// Load from `AI_CONFIG_PATH` or `config/ai.json`; a missing file means
    /// oracles are disabled.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var("AI_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn model_for(&self, role: OracleRole) -> &str {
        match role {
            OracleRole::Relevance => &self.models.relevance,
            OracleRole::Classifier => &self.models.classifier,
            OracleRole::Reinforced => &self.models.reinforced,
            OracleRole::Analyst => &self.models.analyst,
            OracleRole::Translator => &self.models.translator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_key_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(
            &p,
            r#"{"enabled": true, "provider": " OpenAI ", "api_key": "sk-test", "timeout_secs": 0}"#,
        )
        .unwrap();
        let cfg = OracleConfig::load_from_file(&p).unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.daily_limit, 500);
        assert!(cfg.relevance_filter);
        assert_eq!(cfg.model_for(OracleRole::Analyst), "gemini-2.5-pro");
    }

    #[test]
    fn unknown_provider_with_env_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(&p, r#"{"enabled": true, "provider": "acme", "api_key": "ENV"}"#).unwrap();
        assert!(OracleConfig::load_from_file(&p).is_err());
    }
}
