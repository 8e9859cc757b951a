//! Analyst output → canonical [`LanguageSitrep`].
//!
//! The analyst's output schema drifted over time. Each canonical field is
//! resolved once through a priority-ordered list of JSON pointers (newest
//! schema first), so old and new shapes both land in the same document.
//! After mapping, three rules run in order: trend override from the numeric
//! DEFCON delta, evacuation enrichment, and the HITL certification rule.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    Citation, EvacuationPoint, GeoPoint, IntelEntry, LanguageSitrep, Predictive,
    SectorIntelDocument, TacticalOverlay, Trend, UserLocation, PEACETIME_DEFCON,
    PENDING_REVIEW_MARKER,
};
use crate::config::ServiceLinks;
use crate::geo::{self, SectorLocation};

const DEFCON: &[&str] = &["/defcon_status", "/defcon", "/defcon_inputs/defcon"];
const SITREP_ENTRIES: &[&str] = &["/sitrep_entries", "/intel_entries"];
const SUMMARY: &[&str] = &["/summary", "/sitrep"];
const FORECAST_ENTRIES: &[&str] = &["/forecast_entries", "/predictive_analysis/forecast_entries"];
const ROADS: &[&str] = &["/tactical_map/roads_to_avoid", "/roads_to_avoid"];
const DANGER_ZONES: &[&str] = &[
    "/tactical_map/danger_zones",
    "/emergency_avoid_locations",
    "/danger_zones",
];
const FORECAST_DEFCON: &[&str] = &[
    "/predictive_analysis/forecast_defcon",
    "/predictive/defcon",
    "/predictive/forecast_defcon",
];
const RISK_PROBABILITY: &[&str] = &[
    "/predictive_analysis/confidence_score",
    "/predictive/risk_probability",
];
const THREAT_VECTOR: &[&str] = &[
    "/predictive_analysis/threat_vector",
    "/predictive/forecast_trend",
];
const FORECAST_BULLETS: &[&str] = &[
    "/predictive_analysis/forecast_bullets",
    "/predictive/forecast_summary",
];
const RISK_WINDOW: &[&str] = &["/predictive_analysis/risk_window"];
const EVACUATION: &[&str] = &["/evacuation_point", "/evacuation"];
const OVERLAYS: &[&str] = &["/tactical_overlays"];
const JUSTIFICATION: &[&str] = &["/defcon_justification", "/defcon_inputs/justification"];

const DEFAULT_FORECAST_DEFCON: u8 = 3;
const DEFAULT_RISK_PROBABILITY: u8 = 50;

/// Certification state carried over from the previous English master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorState {
    pub defcon: u8,
    pub trend: Trend,
    pub certified: bool,
}

impl Default for PriorState {
    fn default() -> Self {
        Self {
            defcon: PEACETIME_DEFCON,
            trend: Trend::Stable,
            certified: false,
        }
    }
}

impl PriorState {
    pub fn from_document(doc: Option<&SectorIntelDocument>) -> Self {
        match doc.and_then(|d| d.master()) {
            Some(m) => Self {
                defcon: m.defcon_status,
                trend: m.predictive.forecast_trend,
                certified: m.is_certified,
            },
            None => Self::default(),
        }
    }
}

pub struct NormalizeContext<'a> {
    pub location: &'a SectorLocation,
    pub prior: PriorState,
    pub links: &'a ServiceLinks,
    pub now: DateTime<Utc>,
}

fn first<'v>(raw: &'v Value, paths: &[&str]) -> Option<&'v Value> {
    paths
        .iter()
        .find_map(|p| raw.pointer(p).filter(|v| !v.is_null()))
}

fn as_u8(v: &Value) -> Option<u8> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map(|i| i.clamp(0, 255) as u8),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| i.clamp(0, 255) as u8),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Strings stay as-is; objects collapse to "name (reason)" style text.
fn string_list(v: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|it| match it {
            Value::Object(o) => {
                let name = ["name", "road", "location", "title"]
                    .iter()
                    .find_map(|k| o.get(*k).and_then(as_text))?;
                match ["reason", "description", "details"]
                    .iter()
                    .find_map(|k| o.get(*k).and_then(as_text))
                {
                    Some(reason) => Some(format!("{name} ({reason})")),
                    None => Some(name),
                }
            }
            other => as_text(other),
        })
        .collect()
}

fn citations(v: Option<&Value>) -> Vec<Citation> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|c| match c {
            Value::String(s) if s.starts_with("http") => Some(Citation {
                url: Some(s.clone()),
                ..Citation::default()
            }),
            Value::String(s) => Some(Citation {
                title: Some(s.clone()),
                ..Citation::default()
            }),
            Value::Object(o) => Some(Citation {
                title: o.get("title").and_then(as_text),
                url: o.get("url").and_then(as_text),
                source: o.get("source").and_then(as_text),
            }),
            _ => None,
        })
        .collect()
}

fn entries(v: Option<&Value>, text_keys: &[&str]) -> Vec<IntelEntry> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|it| {
            let o = it.as_object()?;
            let topic = o.get("topic").and_then(as_text)?;
            let text = text_keys
                .iter()
                .find_map(|k| o.get(*k).and_then(as_text))?;
            Some(IntelEntry {
                topic,
                text,
                citations: citations(o.get("citations").or_else(|| o.get("sources"))),
            })
        })
        .collect()
}

fn overlays(v: Option<&Value>) -> Vec<TacticalOverlay> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|it| {
            let o = it.as_object()?;
            Some(TacticalOverlay {
                name: o.get("name").and_then(as_text)?,
                lat: o.get("lat").and_then(as_f64),
                lon: o.get("lon").or_else(|| o.get("lng")).and_then(as_f64),
                kind: o.get("type").and_then(as_text),
                date: o.get("date").and_then(as_text),
            })
        })
        .filter(|o| !geo::is_reserved_overlay_name(&o.name))
        .collect()
}

fn evacuation(v: Option<&Value>, user_lat: f64, user_lon: f64) -> EvacuationPoint {
    let Some(o) = v.and_then(Value::as_object) else {
        return EvacuationPoint::unavailable();
    };
    let lat = o.get("lat").and_then(as_f64).filter(|x| *x != 0.0);
    let lon = o
        .get("lon")
        .or_else(|| o.get("lng"))
        .and_then(as_f64)
        .filter(|x| *x != 0.0);
    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            let d = geo::haversine_km(user_lat, user_lon, lat, lon);
            EvacuationPoint {
                name: o
                    .get("name")
                    .and_then(as_text)
                    .unwrap_or_else(|| "Evacuation Point".to_string()),
                lat,
                lon,
                reason: o.get("reason").and_then(as_text).unwrap_or_default(),
                distance_km: Some((d * 10.0).round() / 10.0),
            }
        }
        _ => EvacuationPoint::unavailable(),
    }
}

fn predictive(raw: &Value) -> Predictive {
    let forecast_summary = {
        let from_entries: Vec<String> = entries(first(raw, FORECAST_ENTRIES), &["prediction", "text", "summary"])
            .into_iter()
            .map(|e| format!("{}: {}", e.topic, e.text))
            .collect();
        if !from_entries.is_empty() {
            from_entries
        } else {
            let bullets = string_list(first(raw, FORECAST_BULLETS));
            if bullets.is_empty() {
                let window = first(raw, RISK_WINDOW)
                    .and_then(as_text)
                    .unwrap_or_else(|| "Unknown".to_string());
                vec![format!("Risk Window: {window}")]
            } else {
                bullets
            }
        }
    };

    Predictive {
        forecast_defcon: first(raw, FORECAST_DEFCON)
            .and_then(as_u8)
            .unwrap_or(DEFAULT_FORECAST_DEFCON)
            .clamp(1, 5),
        risk_probability: first(raw, RISK_PROBABILITY)
            .and_then(as_u8)
            .unwrap_or(DEFAULT_RISK_PROBABILITY)
            .min(100),
        forecast_trend: first(raw, THREAT_VECTOR)
            .and_then(Value::as_str)
            .map(Trend::from_label)
            .unwrap_or_default(),
        forecast_summary,
    }
}

/// Map raw analyst JSON onto the canonical SITREP and apply the trend,
/// evacuation and certification rules.
pub fn normalize(raw: &Value, ctx: &NormalizeContext<'_>) -> LanguageSitrep {
    let loc = ctx.location;
    let defcon = first(raw, DEFCON)
        .and_then(as_u8)
        .unwrap_or(PEACETIME_DEFCON)
        .clamp(1, 5);

    let sitrep_entries = entries(first(raw, SITREP_ENTRIES), &["summary", "text"]);
    let forecast_entries = entries(first(raw, FORECAST_ENTRIES), &["prediction", "text", "summary"]);

    let mut summary: Vec<String> = if !sitrep_entries.is_empty() {
        sitrep_entries
            .iter()
            .map(|e| format!("**{}**: {}", e.topic, e.text))
            .collect()
    } else {
        string_list(first(raw, SUMMARY))
    };
    let justification = first(raw, JUSTIFICATION).and_then(as_text);
    if let Some(j) = &justification {
        summary.insert(0, format!("ASSESSMENT: {j}"));
    }
    if summary.is_empty() {
        summary.push("No Intel Summary.".to_string());
    }

    let mut predictive = predictive(raw);

    // The numeric delta is ground truth; the analyst's label only survives
    // when severity did not move.
    let computed = Trend::between(ctx.prior.defcon, defcon);
    if defcon != ctx.prior.defcon {
        predictive.forecast_trend = computed;
    }

    let is_certified = if defcon <= 2 {
        let carried = ctx.prior.certified && ctx.prior.defcon == defcon;
        if !carried {
            summary.insert(0, PENDING_REVIEW_MARKER.to_string());
        }
        carried
    } else {
        true
    };
    tracing::info!(
        target: "mission",
        zip = %loc.zip_code,
        prev_defcon = ctx.prior.defcon,
        defcon,
        trend = ?computed,
        is_certified,
        "sitrep normalized"
    );

    LanguageSitrep {
        defcon_status: defcon,
        location_name: loc.display_name(),
        summary,
        sitrep_entries,
        forecast_entries,
        roads_to_avoid: string_list(first(raw, ROADS)),
        emergency_avoid_locations: string_list(first(raw, DANGER_ZONES)),
        evacuation_point: evacuation(first(raw, EVACUATION), loc.lat, loc.lon),
        predictive,
        trend_24h: computed,
        tactical_overlays: overlays(first(raw, OVERLAYS)),
        is_certified,
        user_location: UserLocation {
            lat: loc.lat,
            lon: loc.lon,
        },
        last_updated: ctx.now.to_rfc3339(),
        zip_code: loc.zip_code.clone(),
        location_geo: GeoPoint::new(loc.lat, loc.lon),
        system_url: ctx.links.system_url.clone(),
        donate_url: ctx.links.donate_url.clone(),
    }
}
