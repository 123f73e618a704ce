use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::CollaboratorError;
use crate::llm::Llm;
use crate::types::{Evaluation, ProblematicClaim};

/// What the text is being checked against.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub query: String,
    pub context: String,
    pub sources: Vec<String>,
}

#[async_trait::async_trait]
pub trait ClaimChecker: Send + Sync {
    async fn evaluate(&self, req: &CheckRequest, text: &str) -> Result<Evaluation, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    text: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    suggested_correction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    faithfulness_score: f64,
    #[serde(default)]
    problematic_claims: Vec<RawClaim>,
}

/// Strip a surrounding ```json fence if the model added one.
pub(crate) fn strip_fences(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else { return t };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_evaluation(raw: &str) -> Result<Evaluation, CollaboratorError> {
    let parsed: RawEvaluation = serde_json::from_str(strip_fences(raw))
        .map_err(|e| CollaboratorError::Malformed(format!("checker output is not valid JSON: {e}")))?;
    let claims = parsed.problematic_claims.into_iter().map(|c| ProblematicClaim {
        text: c.text,
        reason: c.reason,
        suggested_correction: c.suggested_correction.unwrap_or_default(),
    }).collect();
    Evaluation { score: parsed.faithfulness_score, claims }.validate()
}

fn build_check_prompt(req: &CheckRequest, text: &str) -> Result<Vec<ChatCompletionRequestMessage>, CollaboratorError> {
    let sources = if req.sources.is_empty() { "(none)".to_string() } else { req.sources.join("\n") };
    let sys = ChatCompletionRequestSystemMessageArgs::default()
        .content("You are a meticulous fact checker. Judge the response ONLY against the provided context. \
                  Return JSON: {\"faithfulness_score\": number between 0 and 1, \"problematic_claims\": \
                  [{\"text\": exact sentence or phrase from the response, \"reason\": \"...\", \"suggested_correction\": \"...\"}]}")
        .build()
        .map_err(|e| CollaboratorError::Malformed(e.to_string()))?
        .into();
    let usr = ChatCompletionRequestUserMessageArgs::default()
        .content(format!(
            "Query:\n{}\n\nContext:\n{}\n\nSources:\n{sources}\n\nResponse to check:\n{text}",
            req.query, req.context
        ))
        .build()
        .map_err(|e| CollaboratorError::Malformed(e.to_string()))?
        .into();
    Ok(vec![sys, usr])
}

pub struct LlmChecker {
    llm: Arc<dyn Llm>,
}

impl LlmChecker {
    pub fn new(llm: Arc<dyn Llm>) -> Self { Self { llm } }
}

#[async_trait::async_trait]
impl ClaimChecker for LlmChecker {
    async fn evaluate(&self, req: &CheckRequest, text: &str) -> Result<Evaluation, CollaboratorError> {
        let prompt = build_check_prompt(req, text)?;
        let out = self.llm.chat(prompt).await.map_err(CollaboratorError::from_transport)?;
        let eval = parse_evaluation(&out)?;
        tracing::debug!(score = eval.score, claims = eval.claims.len(), "claim check finished");
        Ok(eval)
    }
}
