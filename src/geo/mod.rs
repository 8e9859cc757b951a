//! Distance utility and the fixed set of known hotzones.

pub mod zip_index;

pub use zip_index::{GeoZoneIndex, SectorLocation};

/// Mean Earth radius used for every great-circle distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two lat/lon pairs.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// A named, fixed threat area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotzone {
    pub name: &'static str,
    pub threat: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
}

pub const HOTZONES: &[Hotzone] = &[
    Hotzone {
        name: "PREAH VIHEAR",
        threat: "ARTILLERY",
        lat: 14.3914,
        lon: 104.6804,
        radius_m: 40_000.0,
    },
    Hotzone {
        name: "POIPET",
        threat: "MORTARS",
        lat: 13.66,
        lon: 102.5,
        radius_m: 15_000.0,
    },
    Hotzone {
        name: "CHONG CHOM",
        threat: "ROCKETS",
        lat: 14.43,
        lon: 103.43,
        radius_m: 35_000.0,
    },
    Hotzone {
        name: "TRAT",
        threat: "NAVAL GUNS",
        lat: 11.96,
        lon: 102.8,
        radius_m: 25_000.0,
    },
];

/// Hotzone names double as the static overlay names the analyst echoes back
/// from its prompt; they must never be shown as live markers.
pub fn is_reserved_overlay_name(name: &str) -> bool {
    HOTZONES.iter().any(|z| z.name == name)
}

/// Nearest hotzone and its distance in km. `None` only for an empty zone list.
pub fn nearest_hotzone(lat: f64, lon: f64, zones: &[Hotzone]) -> Option<(Hotzone, f64)> {
    zones
        .iter()
        .map(|z| (*z, haversine_km(lat, lon, z.lat, z.lon)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
