use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use veriloop_rs::checker::{CheckRequest, ClaimChecker};
use veriloop_rs::error::CollaboratorError;
use veriloop_rs::reviser::Reviser;
use veriloop_rs::serper::{Searcher, SerperItem};
use veriloop_rs::types::{Evaluation, ProblematicClaim};

/// Scores text by how many revisions it has been through: each "[fixed]" marker adds `step`.
pub struct MarkerChecker {
    pub base: f64,
    pub step: f64,
    pub seen_context: Mutex<Vec<String>>,
}

impl MarkerChecker {
    pub fn new(base: f64, step: f64) -> Self {
        Self { base, step, seen_context: Mutex::new(vec![]) }
    }
}

#[async_trait]
impl ClaimChecker for MarkerChecker {
    async fn evaluate(&self, req: &CheckRequest, text: &str) -> Result<Evaluation, CollaboratorError> {
        self.seen_context.lock().unwrap().push(req.context.clone());
        let fixes = text.matches("[fixed]").count() as f64;
        let score = (self.base + fixes * self.step).min(1.0);
        let claims = if score >= 1.0 { vec![] } else {
            vec![ProblematicClaim { text: "Docker was invented in 2010".into(), reason: "sources say 2013".into(), suggested_correction: "Docker was released in 2013".into() }]
        };
        Ok(Evaluation { score, claims })
    }
}

pub struct DownChecker;

#[async_trait]
impl ClaimChecker for DownChecker {
    async fn evaluate(&self, _req: &CheckRequest, _text: &str) -> Result<Evaluation, CollaboratorError> {
        Err(CollaboratorError::Unavailable("connection refused".into()))
    }
}

/// Returns the same score for every text, in range or not.
pub struct FixedScoreChecker(pub f64);

#[async_trait]
impl ClaimChecker for FixedScoreChecker {
    async fn evaluate(&self, _req: &CheckRequest, _text: &str) -> Result<Evaluation, CollaboratorError> {
        Ok(Evaluation { score: self.0, claims: vec![] })
    }
}

pub struct AppendReviser;

#[async_trait]
impl Reviser for AppendReviser {
    async fn revise(&self, _req: &CheckRequest, text: &str, _claims: &[ProblematicClaim]) -> Result<String, CollaboratorError> {
        Ok(format!("{text} [fixed]"))
    }
}

pub struct FakeSearcher {
    pub results: Vec<SerperItem>,
}

#[async_trait]
impl Searcher for FakeSearcher {
    async fn search(&self, _query: &str) -> Result<Vec<SerperItem>> {
        Ok(self.results.clone())
    }
}
