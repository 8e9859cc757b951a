//! # Atlas packet model
//! The unit that flows through the gating pipeline: identity, source context,
//! payload and triage metadata. Gates mutate `triage` only through the helpers
//! below so the gate history stays append-only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Source reliability, 1 = most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SourceTier {
    Official = 1,
    TrustedMedia = 2,
    LocalMedia = 3,
    SocialVerified = 4,
    Anonymous = 5,
}

impl SourceTier {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn is_most_trusted(self) -> bool {
        self == SourceTier::Official
    }
}

impl TryFrom<u8> for SourceTier {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(SourceTier::Official),
            2 => Ok(SourceTier::TrustedMedia),
            3 => Ok(SourceTier::LocalMedia),
            4 => Ok(SourceTier::SocialVerified),
            5 => Ok(SourceTier::Anonymous),
            other => Err(format!("source tier must be 1..=5, got {other}")),
        }
    }
}

impl From<SourceTier> for u8 {
    fn from(t: SourceTier) -> u8 {
        t as u8
    }
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rank())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestMethod {
    #[serde(alias = "RSS")]
    Feed,
    Api,
    Scrape,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Raw,
    PendingReinforced,
    Clean,
    Drop,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Clean | ProcessingStatus::Drop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDomain {
    Kinetic,
    Political,
    Infrastructure,
    Logistics,
    CivilUnrest,
    Noise,
    Unclassified,
}

impl RiskDomain {
    /// Lenient label mapping; anything unknown is `Unclassified`.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "KINETIC" => RiskDomain::Kinetic,
            "POLITICAL" => RiskDomain::Political,
            "INFRASTRUCTURE" => RiskDomain::Infrastructure,
            "LOGISTICS" => RiskDomain::Logistics,
            "CIVIL_UNREST" => RiskDomain::CivilUnrest,
            "NOISE" => RiskDomain::Noise,
            _ => RiskDomain::Unclassified,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskDomain::Kinetic => "KINETIC",
            RiskDomain::Political => "POLITICAL",
            RiskDomain::Infrastructure => "INFRASTRUCTURE",
            RiskDomain::Logistics => "LOGISTICS",
            RiskDomain::CivilUnrest => "CIVIL_UNREST",
            RiskDomain::Noise => "NOISE",
            RiskDomain::Unclassified => "UNCLASSIFIED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub artifact_id: String,
    pub fingerprint: String,
    pub canonical_url: String,
    /// Unix seconds.
    pub ingest_timestamp: i64,
    pub source_published_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    pub source_id: String,
    pub source_tier: SourceTier,
    pub ingest_method: IngestMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub title: String,
    pub raw_text: String,
    pub language_code: String,
    pub is_translated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triage {
    pub processing_status: ProcessingStatus,
    pub validity_score: u8,
    pub risk_domain: RiskDomain,
    pub target_region: String,
    gate_history: Vec<String>,
}

impl Default for Triage {
    fn default() -> Self {
        Self {
            processing_status: ProcessingStatus::Raw,
            validity_score: 0,
            risk_domain: RiskDomain::Unclassified,
            target_region: "UNKNOWN".to_string(),
            gate_history: Vec::new(),
        }
    }
}

impl Triage {
    /// Append-only; entries are never edited or removed.
    pub fn record(&mut self, entry: impl Into<String>) {
        self.gate_history.push(entry.into());
    }

    pub fn history(&self) -> &[String] {
        &self.gate_history
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasPacket {
    pub identity: Identity,
    pub source: SourceContext,
    pub payload: Payload,
    pub triage: Triage,
}

impl AtlasPacket {
    pub fn status(&self) -> ProcessingStatus {
        self.triage.processing_status
    }

    /// First 8 chars of the artifact id, used in digests and logs.
    pub fn short_id(&self) -> &str {
        let id = self.identity.artifact_id.as_str();
        id.get(..8).unwrap_or(id)
    }
}

/// Deterministic dedup fingerprint over `"{title}|{url}"`.
///
/// Title is lowercased with whitespace collapsed, URL is trimmed, so casing and
/// whitespace differences between feeds do not defeat dedup.
pub fn fingerprint(title: &str, url: &str) -> String {
    let title = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let normalized = format!("{}|{}", title, url.trim());

    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_case_and_whitespace() {
        let a = fingerprint("  Shelling Reported Near Border ", " https://x.test/a ");
        let b = fingerprint("shelling   reported near border", "https://x.test/a");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_url() {
        assert_ne!(
            fingerprint("same title", "https://x.test/a"),
            fingerprint("same title", "https://x.test/b")
        );
    }

    #[test]
    fn tier_roundtrips_through_u8() {
        let t: SourceTier = serde_json::from_str("3").unwrap();
        assert_eq!(t, SourceTier::LocalMedia);
        assert!(serde_json::from_str::<SourceTier>("9").is_err());
        assert_eq!(serde_json::to_string(&SourceTier::Official).unwrap(), "1");
    }

    #[test]
    fn domain_labels_are_lenient() {
        assert_eq!(RiskDomain::from_label("civil unrest"), RiskDomain::CivilUnrest);
        assert_eq!(RiskDomain::from_label("kinetic"), RiskDomain::Kinetic);
        assert_eq!(RiskDomain::from_label("weather"), RiskDomain::Unclassified);
    }

    #[test]
    fn history_only_grows() {
        let mut t = Triage::default();
        t.record("A");
        t.record("B");
        assert_eq!(t.history(), &["A".to_string(), "B".to_string()]);
    }
}
