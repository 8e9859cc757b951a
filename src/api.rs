use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::config::SentinelConfig;
use crate::dispatch::{
    IntelRequest, IntelResponse, MissionContext, MissionDispatcher, PendingReview, StatusSnapshot,
};
use crate::oracle::OracleSet;
use crate::pipeline::PipelineStats;
use crate::sitrep::{CertifyAction, LanguageSitrep};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<MissionDispatcher>,
}

impl AppState {
    pub fn new(dispatcher: MissionDispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn from_config(cfg: &SentinelConfig, oracles: &OracleSet) -> anyhow::Result<Self> {
        let ctx = MissionContext::from_config(cfg, oracles)?;
        Ok(Self::new(MissionDispatcher::new(ctx, &cfg.default_country)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/intel", get(intel))
        .route("/status", get(status))
        .route("/pipeline/run", post(pipeline_run))
        .route("/admin/pending", get(admin_pending))
        .route("/admin/certify", post(admin_certify))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct IntelQuery {
    #[serde(default, alias = "zip_code")]
    zip: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    lang: Option<String>,
}

async fn intel(State(state): State<AppState>, Query(q): Query<IntelQuery>) -> Json<IntelResponse> {
    let Some(zip) = q.zip.filter(|z| !z.trim().is_empty()) else {
        return Json(IntelResponse::Error {
            message: "zip is required".to_string(),
        });
    };
    let req = IntelRequest {
        zip_code: zip,
        country: q.country,
        lang: q.lang,
    };
    Json(state.dispatcher.handle_request(req).await)
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.dispatcher.status())
}

#[derive(Serialize)]
struct PipelineRunOut {
    clean: usize,
    stats: PipelineStats,
    digest: String,
}

async fn pipeline_run(State(state): State<AppState>) -> Json<PipelineRunOut> {
    let report = state.dispatcher.run_pipeline_cycle().await;
    Json(PipelineRunOut {
        clean: report.clean.len(),
        stats: report.stats,
        digest: report.digest,
    })
}

async fn admin_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingReview>>, (StatusCode, String)> {
    state.dispatcher.pending_reviews().await.map(Json).map_err(|e| {
        tracing::error!(target: "dispatch", error = ?e, "pending review listing failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string())
    })
}

#[derive(Deserialize)]
struct CertifyReq {
    zip_code: String,
    action: CertifyAction,
}

#[derive(Serialize)]
struct CertifyOut {
    status: &'static str,
    zip_code: String,
    data: LanguageSitrep,
}

async fn admin_certify(
    State(state): State<AppState>,
    Json(body): Json<CertifyReq>,
) -> Result<Json<CertifyOut>, (StatusCode, String)> {
    match state.dispatcher.certify(&body.zip_code, body.action).await {
        Ok(Some(master)) => Ok(Json(CertifyOut {
            status: "ok",
            zip_code: body.zip_code.trim().to_string(),
            data: master,
        })),
        Ok(None) => Err((StatusCode::NOT_FOUND, "no sector document".to_string())),
        Err(e) => {
            tracing::error!(target: "dispatch", zip = %body.zip_code, error = ?e, "certify failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string()))
        }
    }
}
