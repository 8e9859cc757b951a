//! Per-sector SITREP document: one record per zip code holding the English
//! master and its derived translations.

pub mod normalize;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::SectorLocation;

pub const MASTER_LANG: &str = "en";

/// Prepended to `summary` whenever a DEFCON 1-2 rating lacks certification.
pub const PENDING_REVIEW_MARKER: &str = "** UNCERTIFIED RATING - PENDING HUMAN VERIFICATION **";
pub const COMMAND_VERIFIED_MARKER: &str = "** COMMAND VERIFIED **";
pub const COMMAND_DISMISSED_MARKER: &str = "** ALERT DISMISSED BY COMMAND **";

/// DEFCON assigned when an operator rejects a pending rating.
pub const REJECTED_DEFCON: u8 = 3;
pub const PEACETIME_DEFCON: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl Trend {
    /// Lower DEFCON is more severe, so a drop in the number is `Rising`.
    pub fn between(prev_defcon: u8, new_defcon: u8) -> Self {
        use std::cmp::Ordering;
        match new_defcon.cmp(&prev_defcon) {
            Ordering::Less => Trend::Rising,
            Ordering::Greater => Trend::Falling,
            Ordering::Equal => Trend::Stable,
        }
    }

    /// Accepts both the canonical labels and the threat-vector vocabulary.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "rising" | "approaching" | "escalating" => Trend::Rising,
            "falling" | "receding" | "deescalating" | "de-escalating" => Trend::Falling,
            _ => Trend::Stable,
        }
    }
}

/// GeoJSON point; coordinates are `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [lon, lat],
        }
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A topic + text narrative item (`sitrep_entries`, `forecast_entries`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelEntry {
    pub topic: String,
    #[serde(alias = "summary", alias = "prediction")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvacuationPoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl EvacuationPoint {
    pub fn unavailable() -> Self {
        Self {
            name: "Check Local Media".to_string(),
            lat: 0.0,
            lon: 0.0,
            reason: "Precise Coordinates Unavailable".to_string(),
            distance_km: None,
        }
    }
}

impl Default for EvacuationPoint {
    fn default() -> Self {
        Self::unavailable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictive {
    #[serde(rename = "defcon", alias = "forecast_defcon")]
    pub forecast_defcon: u8,
    pub risk_probability: u8,
    #[serde(default)]
    pub forecast_trend: Trend,
    #[serde(default)]
    pub forecast_summary: Vec<String>,
}

impl Default for Predictive {
    fn default() -> Self {
        Self {
            forecast_defcon: 3,
            risk_probability: 50,
            forecast_trend: Trend::Stable,
            forecast_summary: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalOverlay {
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// One language rendering of a sector SITREP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSitrep {
    pub defcon_status: u8,
    pub location_name: String,
    pub summary: Vec<String>,
    pub sitrep_entries: Vec<IntelEntry>,
    pub forecast_entries: Vec<IntelEntry>,
    pub roads_to_avoid: Vec<String>,
    pub emergency_avoid_locations: Vec<String>,
    pub evacuation_point: EvacuationPoint,
    pub predictive: Predictive,
    pub trend_24h: Trend,
    pub tactical_overlays: Vec<TacticalOverlay>,
    pub is_certified: bool,
    pub user_location: UserLocation,
    pub last_updated: String,
    pub zip_code: String,
    pub location_geo: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donate_url: Option<String>,
}

impl Default for LanguageSitrep {
    fn default() -> Self {
        Self {
            defcon_status: PEACETIME_DEFCON,
            location_name: String::new(),
            summary: Vec::new(),
            sitrep_entries: Vec::new(),
            forecast_entries: Vec::new(),
            roads_to_avoid: Vec::new(),
            emergency_avoid_locations: Vec::new(),
            evacuation_point: EvacuationPoint::default(),
            predictive: Predictive::default(),
            trend_24h: Trend::Stable,
            tactical_overlays: Vec::new(),
            is_certified: true,
            user_location: UserLocation::default(),
            last_updated: String::new(),
            zip_code: String::new(),
            location_geo: GeoPoint::default(),
            system_url: None,
            donate_url: None,
        }
    }
}

impl LanguageSitrep {
    /// High-severity rating still waiting for an operator.
    pub fn is_pending_review(&self) -> bool {
        self.defcon_status <= 2 && !self.is_certified
    }

    /// Drop overlays named after the static hotzones.
    pub fn purge_reserved_overlays(&mut self) {
        self.tactical_overlays
            .retain(|o| !crate::geo::is_reserved_overlay_name(&o.name));
    }

    /// Lightweight copy for the request path: no citation payloads.
    pub fn without_citations(&self) -> Self {
        let mut out = self.clone();
        for e in out
            .sitrep_entries
            .iter_mut()
            .chain(out.forecast_entries.iter_mut())
        {
            e.citations.clear();
        }
        out
    }

    /// Translations may only change text. Everything numeric, positional or
    /// safety-related is copied back from the English master.
    pub fn pin_to_master(&mut self, master: &LanguageSitrep) {
        self.defcon_status = master.defcon_status;
        self.is_certified = master.is_certified;
        self.trend_24h = master.trend_24h;
        self.predictive.forecast_defcon = master.predictive.forecast_defcon;
        self.predictive.risk_probability = master.predictive.risk_probability;
        self.predictive.forecast_trend = master.predictive.forecast_trend;
        self.evacuation_point.lat = master.evacuation_point.lat;
        self.evacuation_point.lon = master.evacuation_point.lon;
        self.evacuation_point.distance_km = master.evacuation_point.distance_km;
        self.user_location = master.user_location;
        self.location_geo = master.location_geo.clone();
        self.zip_code = master.zip_code.clone();
        self.last_updated = master.last_updated.clone();
        self.system_url = master.system_url.clone();
        self.donate_url = master.donate_url.clone();

        if self.tactical_overlays.len() == master.tactical_overlays.len() {
            for (t, m) in self
                .tactical_overlays
                .iter_mut()
                .zip(master.tactical_overlays.iter())
            {
                t.lat = m.lat;
                t.lon = m.lon;
                t.date = m.date.clone();
            }
        } else {
            self.tactical_overlays = master.tactical_overlays.clone();
        }
        self.purge_reserved_overlays();
    }
}

/// Operator decision on a pending high-severity rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertifyAction {
    Approve,
    Reject,
}

/// Cached intel for one sector, keyed by `zip_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorIntelDocument {
    pub zip_code: String,
    pub country: String,
    /// RFC 3339 generation time of the English master.
    #[serde(default)]
    pub timestamp: Option<String>,
    pub location_geo: GeoPoint,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageSitrep>,
}

impl SectorIntelDocument {
    pub fn new_master(
        loc: &SectorLocation,
        country: &str,
        now: DateTime<Utc>,
        master: LanguageSitrep,
    ) -> Self {
        let mut languages = BTreeMap::new();
        languages.insert(MASTER_LANG.to_string(), master);
        Self {
            zip_code: loc.zip_code.clone(),
            country: country.to_string(),
            timestamp: Some(now.to_rfc3339()),
            location_geo: GeoPoint::new(loc.lat, loc.lon),
            languages,
        }
    }

    /// Placeholder written instead of generating intel inside an exclusion zone.
    pub fn restricted(
        loc: &SectorLocation,
        country: &str,
        zone_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let master = LanguageSitrep {
            defcon_status: PEACETIME_DEFCON,
            location_name: zone_name.to_string(),
            summary: vec![
                "Location is in a Restricted Exclusion Zone.".to_string(),
                "Intel services unavailable in this sector per local regulations.".to_string(),
            ],
            evacuation_point: EvacuationPoint {
                name: "N/A".to_string(),
                lat: 0.0,
                lon: 0.0,
                reason: "Restricted".to_string(),
                distance_km: None,
            },
            predictive: Predictive {
                forecast_defcon: PEACETIME_DEFCON,
                risk_probability: 0,
                forecast_trend: Trend::Stable,
                forecast_summary: vec!["Zone Secure".to_string()],
            },
            is_certified: true,
            user_location: UserLocation {
                lat: loc.lat,
                lon: loc.lon,
            },
            last_updated: now.to_rfc3339(),
            zip_code: loc.zip_code.clone(),
            location_geo: GeoPoint::new(loc.lat, loc.lon),
            ..LanguageSitrep::default()
        };
        Self::new_master(loc, country, now, master)
    }

    pub fn master(&self) -> Option<&LanguageSitrep> {
        self.languages.get(MASTER_LANG)
    }

    pub fn language(&self, lang: &str) -> Option<&LanguageSitrep> {
        self.languages.get(lang)
    }

    /// Severity used for staleness; a document without a master counts as peacetime.
    pub fn defcon(&self) -> u8 {
        self.master()
            .map(|m| m.defcon_status)
            .unwrap_or(PEACETIME_DEFCON)
    }

    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    /// Stamp of the English master a translation is pinned to. Changes on
    /// regeneration and on every operator decision.
    pub fn master_version(&self) -> Option<String> {
        let m = self.master()?;
        Some(format!(
            "{}|{}|{}|{}",
            self.timestamp.as_deref().unwrap_or(""),
            m.last_updated,
            m.defcon_status,
            m.is_certified
        ))
    }

    /// Store a translation made from the master stamped `master_version`.
    /// Returns `false` and leaves the document alone if the master moved on.
    pub fn attach_translation(
        &mut self,
        lang: &str,
        sitrep: LanguageSitrep,
        master_version: &str,
    ) -> bool {
        if self.master_version().as_deref() != Some(master_version) {
            return false;
        }
        self.languages.insert(lang.to_string(), sitrep);
        true
    }

    /// Apply an operator decision to the master and drop derived translations.
    /// Returns `false` when there is no master to act on.
    pub fn certify(&mut self, action: CertifyAction, now: DateTime<Utc>) -> bool {
        let Some(master) = self.languages.get_mut(MASTER_LANG) else {
            return false;
        };
        master.summary.retain(|s| !s.contains("PENDING"));
        match action {
            CertifyAction::Approve => {
                master.is_certified = true;
                master.summary.insert(0, COMMAND_VERIFIED_MARKER.to_string());
            }
            CertifyAction::Reject => {
                master.is_certified = true;
                master.defcon_status = REJECTED_DEFCON;
                master.summary.insert(0, COMMAND_DISMISSED_MARKER.to_string());
            }
        }
        master.last_updated = now.to_rfc3339();
        self.languages.retain(|lang, _| lang == MASTER_LANG);
        true
    }
}

/// RFC 3339, or a naive ISO datetime taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}
