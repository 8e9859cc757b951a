// tests/gates_pipeline.rs
//
// Gate-level contracts and a full orchestrator pass over the RSS fixture.
// Oracles are scripted; no network.

use std::sync::Arc;
use std::time::Duration;

use sentinel_atlas::atlas::{
    AtlasPacket, Identity, IngestMethod, Payload, ProcessingStatus, SourceContext, SourceTier,
    Triage,
};
use sentinel_atlas::gates::{Gate1Ingest, Gate2Base, Gate2Reinforced, IngestVerdict};
use sentinel_atlas::ingest::providers::RssFeedProvider;
use sentinel_atlas::ingest::types::{NewsSource, RawItem};
use sentinel_atlas::oracle::mock::{ScriptedOracle, MOCK_REINFORCED};
use sentinel_atlas::oracle::{DynOracle, OracleError, OracleSet};
use sentinel_atlas::pipeline::{PipelineOrchestrator, EMPTY_DIGEST};
use sentinel_atlas::store::{MemoryPacketStore, PacketStore};

const FIXTURE: &str = include_str!("fixtures/news_rss.xml");
/// 2026-01-06T08:00:00Z, two hours after the newest fixture item.
const FIXTURE_NOW: i64 = 1_767_686_400;
const MAX_AGE: i64 = 72 * 3600;
const T: Duration = Duration::from_secs(2);

fn raw(title: &str, url: &str) -> RawItem {
    RawItem {
        title: title.into(),
        link: url.into(),
        summary: Some(format!("{title} (body)")),
        published_at: None,
        source: "Wire".into(),
        tier: SourceTier::TrustedMedia,
        method: IngestMethod::Feed,
    }
}

fn raw_packet(status: ProcessingStatus) -> AtlasPacket {
    let mut triage = Triage::default();
    triage.processing_status = status;
    AtlasPacket {
        identity: Identity {
            artifact_id: "0f9e8d7c-0000-4000-8000-000000000000".into(),
            fingerprint: "fp".into(),
            canonical_url: "https://news.test/x".into(),
            ingest_timestamp: FIXTURE_NOW,
            source_published_at: None,
        },
        source: SourceContext {
            source_id: "Wire".into(),
            source_tier: SourceTier::LocalMedia,
            ingest_method: IngestMethod::Feed,
        },
        payload: Payload {
            title: "Mortar rounds land near checkpoint".into(),
            raw_text: "Mortar rounds land near checkpoint".into(),
            language_code: "en".into(),
            is_translated: false,
        },
        triage,
    }
}

fn scored(score: i64) -> Result<String, OracleError> {
    Ok(format!(
        r#"{{"risk_domain": "KINETIC", "target_region": "SE_ASIA", "validity_score": {score}}}"#
    ))
}

#[tokio::test]
async fn same_title_and_url_is_admitted_once() {
    let store = Arc::new(MemoryPacketStore::new());
    let gate = Gate1Ingest::new(store.clone(), None, T);
    let item = raw("Shelling near Kantharalak", "https://news.test/a");

    assert!(gate.process(&item, FIXTURE_NOW).await.into_packet().is_some());
    // unrelated items in between do not reset the index
    for i in 0..3 {
        let other = raw(&format!("Other story {i}"), &format!("https://news.test/o{i}"));
        assert!(gate.process(&other, FIXTURE_NOW).await.into_packet().is_some());
    }
    // whitespace and case do not make a new story
    let again = raw("  shelling NEAR   kantharalak ", " https://news.test/a ");
    assert_eq!(gate.process(&again, FIXTURE_NOW).await, IngestVerdict::Duplicate);
    assert_eq!(store.raw_len(), 4);
}

#[tokio::test]
async fn score_bands_route_exactly() {
    let expected = [
        (0, ProcessingStatus::Drop),
        (32, ProcessingStatus::Drop),
        (33, ProcessingStatus::PendingReinforced),
        (66, ProcessingStatus::PendingReinforced),
        (67, ProcessingStatus::Clean),
        (100, ProcessingStatus::Clean),
    ];
    let script = expected.iter().map(|(s, _)| scored(*s)).collect();
    let classifier: DynOracle = Arc::new(ScriptedOracle::new(script, Err(OracleError::Empty)));
    let gate = Gate2Base::new(classifier, T);

    for (score, status) in expected {
        let p = gate.process(raw_packet(ProcessingStatus::Raw)).await;
        assert_eq!(p.status(), status, "score {score}");
        assert_eq!(p.triage.validity_score, score as u8);
        assert_eq!(p.triage.history()[0], format!("GATE2_BASE_SCORE:{score}"));
    }
}

#[tokio::test]
async fn out_of_range_scores_are_clamped() {
    let classifier: DynOracle = Arc::new(ScriptedOracle::new(
        vec![scored(250), scored(-4)],
        Err(OracleError::Empty),
    ));
    let gate = Gate2Base::new(classifier, T);
    let p = gate.process(raw_packet(ProcessingStatus::Raw)).await;
    assert_eq!((p.triage.validity_score, p.status()), (100, ProcessingStatus::Clean));
    let p = gate.process(raw_packet(ProcessingStatus::Raw)).await;
    assert_eq!((p.triage.validity_score, p.status()), (0, ProcessingStatus::Drop));
}

#[tokio::test]
async fn gate2_base_fails_closed() {
    for err in [
        OracleError::Transport("connection reset".into()),
        OracleError::Malformed("expected value".into()),
        OracleError::Timeout(T),
    ] {
        let gate = Gate2Base::new(Arc::new(ScriptedOracle::failing(err)), T);
        let p = gate.process(raw_packet(ProcessingStatus::Raw)).await;
        assert_eq!(p.status(), ProcessingStatus::Drop);
        assert!(p.triage.history().iter().any(|h| h.starts_with("GATE2_BASE_ERROR:")));
    }
}

#[tokio::test]
async fn reinforced_gate_ignores_settled_packets() {
    let verifier = Arc::new(ScriptedOracle::fixed(MOCK_REINFORCED));
    let gate = Gate2Reinforced::new(verifier.clone(), T);

    for status in [ProcessingStatus::Clean, ProcessingStatus::Drop, ProcessingStatus::Raw] {
        let before = raw_packet(status);
        let after = gate.process(before.clone()).await;
        assert_eq!(after, before);
    }
    assert_eq!(verifier.calls(), 0);
}

#[tokio::test]
async fn reinforced_gate_requires_agreeing_score() {
    let verifier = Arc::new(ScriptedOracle::new(
        vec![
            Ok(r#"{"final_decision": "ADMIT", "reasoning": "two outlets confirm", "validity_score": 51}"#.into()),
            Ok(r#"{"final_decision": "ADMIT", "reasoning": "weak", "validity_score": 50}"#.into()),
            Ok(r#"{"final_decision": "DROP", "reasoning": "propaganda", "validity_score": 90}"#.into()),
        ],
        Err(OracleError::Disabled),
    ));
    let gate = Gate2Reinforced::new(verifier, T);
    let pending = || raw_packet(ProcessingStatus::PendingReinforced);

    let p = gate.process(pending()).await;
    assert_eq!(p.status(), ProcessingStatus::Clean);
    assert_eq!(
        p.triage.history(),
        &[
            "GATE2_REINFORCED_SCORE:51".to_string(),
            "REASON:two outlets confirm".to_string(),
            "GATE2_REINFORCED_ADMIT".to_string(),
        ]
    );
    assert_eq!(gate.process(pending()).await.status(), ProcessingStatus::Drop);
    assert_eq!(gate.process(pending()).await.status(), ProcessingStatus::Drop);

    let p = gate.process(pending()).await;
    assert_eq!(p.status(), ProcessingStatus::Drop);
    assert!(p.triage.history()[0].starts_with("GATE2_REINFORCED_ERROR:"));
}

fn fixture_oracles(classifier: ScriptedOracle) -> OracleSet {
    OracleSet {
        relevance: None,
        classifier: Arc::new(classifier),
        reinforced: Arc::new(ScriptedOracle::fixed(MOCK_REINFORCED)),
        analyst: Arc::new(ScriptedOracle::failing(OracleError::Disabled)),
        translator: Arc::new(ScriptedOracle::failing(OracleError::Disabled)),
        timeout: T,
    }
}

#[tokio::test]
async fn fixture_cycle_routes_persists_and_is_idempotent() {
    let feeds: Vec<Box<dyn NewsSource>> = vec![Box::new(RssFeedProvider::from_fixture(
        "Google News",
        SourceTier::TrustedMedia,
        FIXTURE,
    ))];
    // artillery → 80 (clean), poipet → 50 (review, verifier admits), trat → 10 (drop)
    let classifier = ScriptedOracle::new(vec![scored(80), scored(50), scored(10)], scored(0));
    let store = Arc::new(MemoryPacketStore::new());
    let orch = PipelineOrchestrator::new(store.clone(), &fixture_oracles(classifier), 30);

    let report = orch.run_cycle(&feeds, FIXTURE_NOW, MAX_AGE).await;
    let s = &report.stats;
    assert_eq!(s.stale, 1, "archive item is older than the max age");
    assert_eq!(s.fetched, 4);
    assert_eq!(s.duplicates, 1, "syndicated copy is a duplicate");
    assert_eq!(s.admitted, 3);
    assert_eq!(s.sent_to_review, 1);
    assert_eq!(s.clean, 2);
    assert_eq!(s.dropped, 1);

    let lines: Vec<&str> = report.digest.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("Artillery exchange reported near Preah Vihear overnight (score 80, KINETIC)"));
    assert!(lines[1].contains("Border checkpoint at Poipet closed to traffic (score 60, KINETIC)"));
    assert!(!report.digest.contains("Trat"));

    let again = orch.run_cycle(&feeds, FIXTURE_NOW, MAX_AGE).await;
    assert_eq!(again.stats.duplicates, 4);
    assert_eq!(again.stats.clean, 0);
    assert_eq!(again.digest, EMPTY_DIGEST);
    assert_eq!(store.clean_packets().await.unwrap().len(), 2);

    let recent = orch.recent_digest(FIXTURE_NOW, MAX_AGE).await;
    assert_eq!(recent.lines().count(), 2);
}

#[tokio::test]
async fn one_bad_item_does_not_block_the_batch() {
    let classifier = ScriptedOracle::new(
        vec![Err(OracleError::Malformed("garbage".into())), scored(90)],
        scored(0),
    );
    let orch = PipelineOrchestrator::new(
        Arc::new(MemoryPacketStore::new()),
        &fixture_oracles(classifier),
        30,
    );
    let items = vec![
        raw("First story", "https://news.test/1"),
        raw("Second story", "https://news.test/2"),
    ];
    let report = orch.run_batch(&items, FIXTURE_NOW).await;
    assert_eq!(report.stats.dropped, 1);
    assert_eq!(report.clean.len(), 1);
    assert_eq!(report.clean[0].payload.title, "Second story");
}

#[tokio::test]
async fn batch_cap_bounds_oracle_spend() {
    let classifier = Arc::new(ScriptedOracle::new(Vec::new(), scored(90)));
    let oracles = OracleSet {
        classifier: classifier.clone(),
        ..fixture_oracles(ScriptedOracle::fixed("{}"))
    };
    let orch = PipelineOrchestrator::new(Arc::new(MemoryPacketStore::new()), &oracles, 2);
    let items: Vec<RawItem> = (0..5)
        .map(|i| raw(&format!("Story {i}"), &format!("https://news.test/{i}")))
        .collect();
    let report = orch.run_batch(&items, FIXTURE_NOW).await;
    assert_eq!(report.clean.len(), 2);
    assert_eq!(classifier.calls(), 2);
}
