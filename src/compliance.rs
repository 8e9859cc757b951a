// src/compliance.rs
//! Per-country exclusion zones. Zone files are read lazily, once per country,
//! and kept for the life of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::tables::{self, lenient_opt_f64};

/// Fixed degrees-per-km conversion for circle radii.
pub const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneShape {
    /// Planar circle in degree space.
    Circle { lat: f64, lon: f64, radius_deg: f64 },
    Rectangle {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    },
}

impl ZoneShape {
    /// Boundary-inclusive.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match *self {
            ZoneShape::Circle {
                lat: c_lat,
                lon: c_lon,
                radius_deg,
            } => {
                let d = ((lat - c_lat).powi(2) + (lon - c_lon).powi(2)).sqrt();
                d <= radius_deg
            }
            ZoneShape::Rectangle {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            } => lat >= min_lat && lat <= max_lat && lon >= min_lon && lon <= max_lon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestrictedZone {
    pub name: String,
    pub risk_level: String,
    pub shape: ZoneShape,
}

/// Result of a point check; `zone` is the first matching zone in load order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceVerdict {
    pub zone: Option<RestrictedZone>,
}

impl ComplianceVerdict {
    pub fn is_blocked(&self) -> bool {
        self.zone.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ZoneRow {
    #[serde(alias = "name")]
    zone_name: String,
    #[serde(default)]
    risk_level: Option<String>,
    shape_type: String,
    #[serde(default, alias = "latitude", deserialize_with = "lenient_opt_f64")]
    lat_center: Option<f64>,
    #[serde(default, alias = "longitude", deserialize_with = "lenient_opt_f64")]
    lng_center: Option<f64>,
    #[serde(default, alias = "radius", deserialize_with = "lenient_opt_f64")]
    radius_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    bound_nw_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    bound_nw_lng: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    bound_se_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    bound_se_lng: Option<f64>,
}

impl ZoneRow {
    fn into_zone(self) -> Result<RestrictedZone, String> {
        let shape = match self.shape_type.trim().to_ascii_uppercase().as_str() {
            "CIRCLE" => match (self.lat_center, self.lng_center, self.radius_km) {
                (Some(lat), Some(lon), Some(km)) if km > 0.0 => ZoneShape::Circle {
                    lat,
                    lon,
                    radius_deg: km / KM_PER_DEGREE,
                },
                _ => return Err("circle needs center and positive radius".into()),
            },
            "RECTANGLE" => match (
                self.bound_nw_lat,
                self.bound_nw_lng,
                self.bound_se_lat,
                self.bound_se_lng,
            ) {
                (Some(nw_lat), Some(nw_lng), Some(se_lat), Some(se_lng)) => ZoneShape::Rectangle {
                    min_lat: se_lat.min(nw_lat),
                    max_lat: se_lat.max(nw_lat),
                    min_lon: nw_lng.min(se_lng),
                    max_lon: nw_lng.max(se_lng),
                },
                _ => return Err("rectangle needs all four bounds".into()),
            },
            other => return Err(format!("unknown shape_type {other:?}")),
        };
        Ok(RestrictedZone {
            name: self.zone_name.trim().to_string(),
            risk_level: self
                .risk_level
                .map(|r| r.trim().to_string())
                .unwrap_or_else(|| "UNSPECIFIED".to_string()),
            shape,
        })
    }
}

/// Exclusion-zone service. Construct once and share behind an `Arc`.
pub struct ComplianceEngine {
    zones_dir: PathBuf,
    zones: RwLock<HashMap<String, Arc<Vec<RestrictedZone>>>>,
}

impl ComplianceEngine {
    pub fn new(zones_dir: impl Into<PathBuf>) -> Self {
        Self {
            zones_dir: zones_dir.into(),
            zones: RwLock::new(HashMap::new()),
        }
    }

    /// Preload a country's zones without touching disk.
    pub fn with_zones(self, country: &str, zones: Vec<RestrictedZone>) -> Self {
        if let Ok(mut map) = self.zones.write() {
            map.insert(country_key(country), Arc::new(zones));
        }
        self
    }

    /// Load `<zones_dir>/<CC>.toml` (or `.json`) if this country has not been
    /// loaded yet. A country without a file has no zones.
    pub fn ensure_loaded(&self, country: &str) -> Arc<Vec<RestrictedZone>> {
        let key = country_key(country);
        if let Some(z) = self.zones.read().ok().and_then(|m| m.get(&key).cloned()) {
            return z;
        }

        let loaded = Arc::new(self.read_zone_file(&key));
        let mut map = match self.zones.write() {
            Ok(m) => m,
            Err(poison) => poison.into_inner(),
        };
        // another request may have loaded it meanwhile; keep the first copy
        map.entry(key).or_insert(loaded).clone()
    }

    fn read_zone_file(&self, key: &str) -> Vec<RestrictedZone> {
        let Some(path) = self.zone_file(key) else {
            tracing::info!(target: "compliance", country = key, "no zone file, country unrestricted");
            return Vec::new();
        };
        let rows = match tables::load_rows_from(&path, "zones") {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(target: "compliance", country = key, error = ?e, "zone file unreadable");
                return Vec::new();
            }
        };

        let mut zones = Vec::with_capacity(rows.len());
        for row in tables::typed_rows::<ZoneRow>(rows, "zones") {
            let name = row.zone_name.clone();
            match row.into_zone() {
                Ok(z) => zones.push(z),
                Err(reason) => {
                    tracing::warn!(target: "compliance", country = key, zone = %name, %reason, "skipping zone row")
                }
            }
        }
        tracing::info!(target: "compliance", country = key, zones = zones.len(), "zones loaded");
        zones
    }

    fn zone_file(&self, key: &str) -> Option<PathBuf> {
        ["toml", "json"]
            .iter()
            .map(|ext| self.zones_dir.join(format!("{key}.{ext}")))
            .find(|p| p.exists())
    }

    /// Test a point against the country's zones; first match in load order wins.
    pub fn check_point(&self, lat: f64, lon: f64, country: &str) -> ComplianceVerdict {
        let zones = self.ensure_loaded(country);
        let zone = zones.iter().find(|z| z.shape.contains(lat, lon)).cloned();
        if let Some(z) = &zone {
            counter!("compliance_blocked_total").increment(1);
            tracing::info!(target: "compliance", zone = %z.name, risk = %z.risk_level, "point inside restricted zone");
        }
        ComplianceVerdict { zone }
    }
}

fn country_key(country: &str) -> String {
    country.trim().to_ascii_uppercase()
}
