// tests/metrics.rs
//
// The Prometheus endpoint exposes gate and dispatch series once traffic
// has gone through. One test per binary: the recorder is process-global.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use sentinel_atlas::atlas::{IngestMethod, SourceTier};
use sentinel_atlas::gates::{Gate1Ingest, Gate2Base};
use sentinel_atlas::ingest::types::RawItem;
use sentinel_atlas::metrics::Metrics;
use sentinel_atlas::oracle::mock::{ScriptedOracle, MOCK_CLASSIFICATION};
use sentinel_atlas::store::MemoryPacketStore;

#[tokio::test]
async fn metrics_endpoint_contains_gate_series() {
    let m = Metrics::init(30).expect("recorder installs once per process");

    let gate1 = Gate1Ingest::new(Arc::new(MemoryPacketStore::new()), None, Duration::from_secs(1));
    let gate2 = Gate2Base::new(
        Arc::new(ScriptedOracle::fixed(MOCK_CLASSIFICATION)),
        Duration::from_secs(1),
    );
    let item = RawItem {
        title: "Rocket fire reported near Chong Chom".into(),
        link: "https://news.test/chong-chom".into(),
        summary: None,
        published_at: None,
        source: "Wire".into(),
        tier: SourceTier::Official,
        method: IngestMethod::Api,
    };
    let packet = gate1.process(&item, 1_767_686_400).await.into_packet().unwrap();
    gate2.process(packet).await;
    // second submission is a duplicate
    gate1.process(&item, 1_767_686_400).await;

    let resp = m
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "gate1_admitted_total",
        "gate1_dropped_total",
        "gate2_routed_total",
        "gate2_validity_score",
        "pipeline_max_items_per_cycle",
    ] {
        assert!(text.contains(needle), "missing {needle} in:\n{text}");
    }
}
