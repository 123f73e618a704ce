// src/server.rs
use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::checker::{CheckRequest, ClaimChecker};
use crate::config::{LoopConfig, VerificationLevel};
use crate::evidence::gather_context;
use crate::report::{badge, improvement_report, with_footer, Badge};
use crate::reviser::Reviser;
use crate::serper::Searcher;
use crate::types::{Assessment, Evaluation, ProblematicClaim, VerificationOutcome};
use crate::verification::verify_content;

#[derive(Clone)]
pub struct Engine {
    pub checker: Arc<dyn ClaimChecker>,
    pub reviser: Arc<dyn Reviser>,
    pub searcher: Option<Arc<dyn Searcher>>,
    pub loop_cfg: LoopConfig,
    pub search_concurrency: usize,
}

impl Engine {
    /// Fill in context and sources from search when the caller sent a query but no context.
    pub async fn check_request(&self, query: Option<String>, context: Option<String>, sources: Vec<String>) -> CheckRequest {
        let query = query.unwrap_or_default();
        let mut req = CheckRequest { query, context: context.unwrap_or_default(), sources };
        if req.context.trim().is_empty() && !req.query.trim().is_empty() {
            if let Some(serp) = &self.searcher {
                let ev = gather_context(serp.as_ref(), &[req.query.clone()], self.search_concurrency).await;
                req.context = ev.context;
                if req.sources.is_empty() { req.sources = ev.sources; }
            }
        }
        req
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyReq {
    pub text: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub level: Option<VerificationLevel>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub pass_threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResp {
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
    pub content: String,   // final text plus footer when verified after revision
    pub report: String,
    pub badge: Badge,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateReq {
    pub text: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateResp {
    pub faithfulness_score: f64,
    pub assessment: Assessment,
    pub problematic_claims: Vec<ProblematicClaim>,
}

pub async fn verify(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<VerifyReq>,
) -> Result<Json<VerifyResp>, StatusCode> {
    if req.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let base = req.level.map(|l| l.loop_config()).unwrap_or(engine.loop_cfg);
    let cfg = base.with_overrides(req.pass_threshold, req.max_iterations).map_err(|e| {
        tracing::debug!(error = %e, "rejecting verify request");
        StatusCode::BAD_REQUEST
    })?;

    let check = engine.check_request(req.query, req.context, req.sources).await;
    let outcome = verify_content(engine.checker.as_ref(), engine.reviser.as_ref(), cfg, &check, req.text).await;
    let resp = VerifyResp {
        content: with_footer(&outcome),
        report: improvement_report(&outcome),
        badge: badge(&outcome.summary, outcome.improved()),
        outcome,
    };
    Ok(Json(resp))
}

pub async fn evaluate(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<EvaluateReq>,
) -> Result<Json<EvaluateResp>, StatusCode> {
    if req.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let check = engine.check_request(req.query, req.context, req.sources).await;
    let eval = engine.checker.evaluate(&check, &req.text).await.and_then(Evaluation::validate).map_err(|e| {
        tracing::warn!(error = %e, "evaluation failed");
        StatusCode::BAD_GATEWAY
    })?;
    Ok(Json(EvaluateResp { faithfulness_score: eval.score, assessment: eval.assessment(), problematic_claims: eval.claims }))
}

async fn health() -> &'static str { "ok" }

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/verify", post(verify))
        .route("/evaluate", post(evaluate))
        .route("/health", get(health))
        .with_state(engine)
}

pub async fn run_server(engine: Engine, addr: &str) -> anyhow::Result<()> {
    let app = router(Arc::new(engine));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
