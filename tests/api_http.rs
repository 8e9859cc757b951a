// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /intel (validation, unknown sector, calculating → success)
// - GET /status
// - POST /pipeline/run
// - GET /admin/pending + POST /admin/certify

mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use common::*;
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use sentinel_atlas::api::{self, AppState};
use sentinel_atlas::oracle::mock::ScriptedOracle;
use sentinel_atlas::sitrep::{LanguageSitrep, SectorIntelDocument};
use sentinel_atlas::store::{MemorySectorStore, SectorStore};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app(analyst_defcon: u8) -> (Router, Arc<MemorySectorStore>) {
    let h = harness(
        ScriptedOracle::fixed(&sitrep_json(analyst_defcon)),
        ScriptedOracle::fixed("{}"),
    );
    let sectors = h.sectors.clone();
    (api::router(AppState::new(h.dispatcher)), sectors)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn call_json(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let (status, bytes) = call(app, method, uri, body).await;
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app(4);
    let (status, bytes) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), "OK");
}

#[tokio::test]
async fn intel_validates_input() {
    let (app, _) = test_app(4);

    let (_, v) = call_json(&app, "GET", "/intel", None).await;
    assert_eq!(v, json!({"status": "error", "message": "zip is required"}));

    let (_, v) = call_json(&app, "GET", "/intel?zip=99999", None).await;
    assert_eq!(v, json!({"status": "error", "message": "Unknown sector"}));
}

#[tokio::test]
async fn intel_calculates_then_serves() {
    let (app, sectors) = test_app(4);

    let (status, v) = call_json(&app, "GET", "/intel?zip=33110&lang=en", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "calculating");

    // background mission runs on the test runtime; poll like a client would
    let mut served = Json::Null;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if sectors.get(KANTHARALAK).await.unwrap().is_some() {
            served = call_json(&app, "GET", "/intel?zip=33110", None).await.1;
            break;
        }
    }
    assert_eq!(served["status"], "success", "got {served}");
    assert_eq!(served["data"]["defcon_status"], 4);
    assert_eq!(served["data"]["zip_code"], "33110");
    assert_eq!(served["data"]["location_geo"]["type"], "Point");
    assert_eq!(served["data"]["trend_24h"], "Rising");

    let (_, st) = call_json(&app, "GET", "/status", None).await;
    assert_eq!(st["stage"], "Done");
    assert_eq!(st["progress"], 100);
}

#[tokio::test]
async fn status_starts_idle() {
    let (app, _) = test_app(4);
    let (status, v) = call_json(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["stage"], "Idle");
    assert_eq!(v["progress"], 0);
    assert!(v["updated_at"].is_string());
}

#[tokio::test]
async fn pipeline_run_without_feeds_reports_empty_digest() {
    let (app, _) = test_app(4);
    let (status, v) = call_json(&app, "POST", "/pipeline/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["clean"], 0);
    assert_eq!(v["stats"]["fetched"], 0);
    assert_eq!(v["digest"], "No recent kinetic reports.");
}

#[tokio::test]
async fn admin_review_queue_and_certify() {
    let (app, sectors) = test_app(4);
    let pending = LanguageSitrep {
        defcon_status: 1,
        is_certified: false,
        summary: vec!["** UNCERTIFIED RATING - PENDING HUMAN VERIFICATION **".into()],
        ..LanguageSitrep::default()
    };
    sectors
        .replace(SectorIntelDocument::new_master(
            &location(KANTHARALAK),
            "TH",
            Utc::now(),
            pending,
        ))
        .await
        .unwrap();

    let (_, v) = call_json(&app, "GET", "/admin/pending", None).await;
    assert_eq!(v.as_array().map(Vec::len), Some(1));
    assert_eq!(v[0]["zip_code"], "33110");

    let (status, v) = call_json(
        &app,
        "POST",
        "/admin/certify",
        Some(json!({"zip_code": "33110", "action": "APPROVE"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data"]["is_certified"], true);
    assert_eq!(v["data"]["summary"][0], "** COMMAND VERIFIED **");

    let (_, v) = call_json(&app, "GET", "/admin/pending", None).await;
    assert_eq!(v, json!([]));

    let (status, _) = call(
        &app,
        "POST",
        "/admin/certify",
        Some(json!({"zip_code": "10200", "action": "REJECT"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
