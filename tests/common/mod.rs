// tests/common/mod.rs
//
// Shared wiring for dispatcher-level tests: an in-memory sector store,
// scripted oracles and a tiny postal table. No network, no files.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sentinel_atlas::compliance::{ComplianceEngine, RestrictedZone, ZoneShape, KM_PER_DEGREE};
use sentinel_atlas::config::ServiceLinks;
use sentinel_atlas::dispatch::mission::DEFAULT_ANALYST_PROMPT;
use sentinel_atlas::dispatch::{InFlightSet, MissionContext, MissionDispatcher, StatusBoard};
use sentinel_atlas::geo::{GeoZoneIndex, SectorLocation};
use sentinel_atlas::oracle::mock::{ScriptedOracle, MOCK_CLASSIFICATION, MOCK_REINFORCED};
use sentinel_atlas::oracle::{DynOracle, OracleSet};
use sentinel_atlas::pipeline::PipelineOrchestrator;
use sentinel_atlas::store::{MemoryPacketStore, MemorySectorStore, SectorStore};
use serde_json::json;

pub const KANTHARALAK: &str = "33110";
pub const TEMPLE: &str = "33190";
pub const BANGKOK: &str = "10200";

pub fn location(zip: &str) -> SectorLocation {
    let (lat, lon, province, district) = match zip {
        KANTHARALAK => (14.6533, 104.6486, "Si Sa Ket", "Kantharalak"),
        TEMPLE => (14.3914, 104.6804, "Si Sa Ket", "Phu Sing"),
        _ => (13.7563, 100.4931, "Bangkok", "Phra Nakhon"),
    };
    SectorLocation {
        zip_code: zip.to_string(),
        lat,
        lon,
        province: province.to_string(),
        district: district.to_string(),
    }
}

pub fn temple_zone() -> RestrictedZone {
    RestrictedZone {
        name: "Preah Vihear Temple Exclusion Zone".to_string(),
        risk_level: "CRITICAL".to_string(),
        shape: ZoneShape::Circle {
            lat: 14.3914,
            lon: 104.6804,
            radius_deg: 5.0 / KM_PER_DEGREE,
        },
    }
}

/// Analyst reply in the current schema.
pub fn sitrep_json(defcon: u8) -> String {
    json!({
        "defcon_status": defcon,
        "defcon_justification": format!("Test rating {defcon}"),
        "sitrep_entries": [{"topic": "Border", "summary": "Shelling reported east of the sector."}],
        "tactical_map": {"roads_to_avoid": ["Route 221"], "danger_zones": ["Ban Phum Saron"]},
        "predictive_analysis": {"forecast_defcon": defcon, "confidence_score": 70, "threat_vector": "Static"},
        "evacuation_point": {"name": "Kantharalak Hospital", "lat": 14.66, "lon": 104.65, "reason": "Hardened shelter"},
        "tactical_overlays": [
            {"name": "POIPET", "lat": 13.66, "lon": 102.5, "type": "MORTARS"},
            {"name": "Checkpoint 7", "lat": 14.5, "lon": 104.6, "type": "CLOSURE", "date": "2026-01-06"}
        ]
    })
    .to_string()
}

pub struct Harness {
    pub dispatcher: MissionDispatcher,
    pub sectors: Arc<MemorySectorStore>,
    pub analyst: Arc<ScriptedOracle>,
    pub translator: Arc<ScriptedOracle>,
}

pub fn harness(analyst: ScriptedOracle, translator: ScriptedOracle) -> Harness {
    let analyst = Arc::new(analyst);
    let translator = Arc::new(translator);
    let sectors = Arc::new(MemorySectorStore::new());

    let oracles = OracleSet {
        relevance: None,
        classifier: Arc::new(ScriptedOracle::fixed(MOCK_CLASSIFICATION)),
        reinforced: Arc::new(ScriptedOracle::fixed(MOCK_REINFORCED)),
        analyst: analyst.clone() as DynOracle,
        translator: translator.clone() as DynOracle,
        timeout: Duration::from_secs(2),
    };

    let ctx = MissionContext {
        geo: Arc::new(GeoZoneIndex::from_locations(
            [KANTHARALAK, TEMPLE, BANGKOK].map(location),
        )),
        compliance: Arc::new(
            ComplianceEngine::new("does-not-exist").with_zones("TH", vec![temple_zone()]),
        ),
        sectors: sectors.clone() as Arc<dyn SectorStore>,
        pipeline: Arc::new(PipelineOrchestrator::new(
            Arc::new(MemoryPacketStore::new()),
            &oracles,
            30,
        )),
        feeds: Vec::new(),
        analyst: oracles.analyst.clone(),
        translator: oracles.translator.clone(),
        timeout: oracles.timeout,
        prompt_template: DEFAULT_ANALYST_PROMPT.to_string(),
        links: ServiceLinks::default(),
        max_item_age_secs: 72 * 3600,
        in_flight: InFlightSet::new(),
        status: Arc::new(StatusBoard::new(chrono::Duration::seconds(60))),
    };

    Harness {
        dispatcher: MissionDispatcher::new(ctx, "TH"),
        sectors,
        analyst,
        translator,
    }
}
