use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::tables::{self, lenient_f64, lenient_string};

/// Where a postal code sits and what it is called.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorLocation {
    pub zip_code: String,
    pub lat: f64,
    pub lon: f64,
    pub province: String,
    pub district: String,
}

impl SectorLocation {
    /// "Province, District" as shown in SITREPs.
    pub fn display_name(&self) -> String {
        match (self.province.is_empty(), self.district.is_empty()) {
            (false, false) => format!("{}, {}", self.province, self.district),
            (false, true) => self.province.clone(),
            (true, false) => self.district.clone(),
            (true, true) => format!("Sector {}", self.zip_code),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostalRow {
    #[serde(
        rename = "POSTAL_CODE",
        alias = "postal_code",
        alias = "zip_code",
        deserialize_with = "lenient_string"
    )]
    postal_code: String,
    #[serde(rename = "LATITUDE", alias = "latitude", alias = "lat", deserialize_with = "lenient_f64")]
    lat: f64,
    #[serde(
        rename = "LONGITUDE",
        alias = "longitude",
        alias = "lon",
        deserialize_with = "lenient_f64"
    )]
    lon: f64,
    #[serde(rename = "PROVINCE_ENGLISH", alias = "province", default)]
    province: String,
    #[serde(rename = "DISTRICT_ENGLISH", alias = "district", default)]
    district: String,
}

/// Read-only postal code → location lookup.
#[derive(Debug, Clone, Default)]
pub struct GeoZoneIndex {
    by_zip: HashMap<String, SectorLocation>,
}

impl GeoZoneIndex {
    /// Load a postal table (`[[postal_codes]]` TOML rows or a JSON array).
    pub fn load_from(path: &Path) -> Result<Self> {
        let rows = tables::load_rows_from(path, "postal_codes")?;
        let idx = Self::from_rows(tables::typed_rows::<PostalRow>(rows, "postal_codes"));
        tracing::info!(target: "dispatch", sectors = idx.len(), path = %path.display(), "postal index loaded");
        Ok(idx)
    }

    fn from_rows(rows: Vec<PostalRow>) -> Self {
        let by_zip = rows
            .into_iter()
            .filter(|r| !r.postal_code.is_empty())
            .map(|r| {
                let loc = SectorLocation {
                    zip_code: r.postal_code.clone(),
                    lat: r.lat,
                    lon: r.lon,
                    province: r.province.trim().to_string(),
                    district: r.district.trim().to_string(),
                };
                (r.postal_code, loc)
            })
            .collect();
        Self { by_zip }
    }

    /// Build an index directly (tests, embedded tables).
    pub fn from_locations(locs: impl IntoIterator<Item = SectorLocation>) -> Self {
        Self {
            by_zip: locs.into_iter().map(|l| (l.zip_code.clone(), l)).collect(),
        }
    }

    pub fn resolve(&self, zip: &str) -> Option<&SectorLocation> {
        self.by_zip.get(zip.trim())
    }

    pub fn len(&self) -> usize {
        self.by_zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_zip.is_empty()
    }
}
