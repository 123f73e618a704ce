use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs};
use std::sync::Arc;

use crate::checker::{strip_fences, CheckRequest};
use crate::error::CollaboratorError;
use crate::llm::Llm;
use crate::segments::{locate_claims, sentence_spans, window_context, SlidingWinCfg};
use crate::types::ProblematicClaim;

#[async_trait::async_trait]
pub trait Reviser: Send + Sync {
    /// Return a corrected version of `text` addressing `claims`.
    async fn revise(&self, req: &CheckRequest, text: &str, claims: &[ProblematicClaim]) -> Result<String, CollaboratorError>;
}

const MIN_LEN_RATIO: f64 = 0.3;
const MAX_LEN_RATIO: f64 = 4.0;
const MAX_CONTEXT_CHARS: usize = 4000;

const REWRITE_SYSTEM: &str = "You are an expert content corrector. Replace inaccurate information with facts \
from the provided context while preserving style, tone, structure and technical depth. Do not remove claims \
without replacing them, do not add hedging or disclaimers, and never invent information. \
Return ONLY the corrected text.";

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn msg_err(e: async_openai::error::OpenAIError) -> CollaboratorError {
    CollaboratorError::Malformed(e.to_string())
}

fn describe_claims(claims: &[&ProblematicClaim]) -> String {
    claims.iter().map(|c| {
        let mut line = format!("- \"{}\": {}", c.text, c.reason);
        if !c.suggested_correction.is_empty() {
            line.push_str(&format!(" (suggested: {})", c.suggested_correction));
        }
        line
    }).collect::<Vec<_>>().join("\n")
}

fn build_prompt(user: String) -> Result<Vec<ChatCompletionRequestMessage>, CollaboratorError> {
    let sys = ChatCompletionRequestSystemMessageArgs::default().content(REWRITE_SYSTEM).build().map_err(msg_err)?.into();
    let usr = ChatCompletionRequestUserMessageArgs::default().content(user).build().map_err(msg_err)?.into();
    Ok(vec![sys, usr])
}

fn sentence_prompt(req: &CheckRequest, sentence: &str, left: &str, right: &str, claims: &[&ProblematicClaim])
-> Result<Vec<ChatCompletionRequestMessage>, CollaboratorError> {
    build_prompt(format!(
        "Rewrite the sentence between <SOS> and <EOS> so it is factually accurate.\n\n\
         ContextL: {left}\n<SOS> {sentence} <EOS>\nContextR: {right}\n\n\
         Problems:\n{}\n\nReference context:\n{}\n\nReturn only the rewritten sentence.",
        describe_claims(claims),
        truncate_chars(&req.context, MAX_CONTEXT_CHARS),
    ))
}

fn full_prompt(req: &CheckRequest, text: &str, claims: &[&ProblematicClaim]) -> Result<Vec<ChatCompletionRequestMessage>, CollaboratorError> {
    build_prompt(format!(
        "Rewrite this text to improve factual accuracy.\n\n==== ORIGINAL TEXT ====\n{text}\n\n\
         ==== KNOWN PROBLEMS ====\n{}\n\n==== CONTEXT FROM RELIABLE SOURCES ====\n{}\n\n\
         Return ONLY the corrected text without prefixes or explanations.",
        describe_claims(claims),
        truncate_chars(&req.context, MAX_CONTEXT_CHARS),
    ))
}

/// Reject rewrites whose length is implausible relative to the input.
pub fn check_length(original: &str, rewritten: &str) -> Result<(), CollaboratorError> {
    let (o, r) = (original.chars().count() as f64, rewritten.chars().count() as f64);
    if r < o * MIN_LEN_RATIO {
        return Err(CollaboratorError::Malformed(format!("rewrite suspiciously short: {r} chars for {o}")));
    }
    if r > o * MAX_LEN_RATIO {
        return Err(CollaboratorError::Malformed(format!("rewrite suspiciously long: {r} chars for {o}")));
    }
    Ok(())
}

/// Replace byte ranges in `text`. Ranges must not overlap.
pub fn splice(text: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
    let mut out = text.to_string();
    for (start, end, replacement) in edits {
        out.replace_range(start..end, &replacement);
    }
    out
}

pub struct LlmReviser {
    llm: Arc<dyn Llm>,
    window: SlidingWinCfg,
}

impl LlmReviser {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm, window: SlidingWinCfg { left: 2, right: 1 } }
    }

    async fn rewrite_sentences(&self, req: &CheckRequest, text: &str, claims: &[ProblematicClaim]) -> Result<Option<String>, CollaboratorError> {
        let spans = sentence_spans(text);
        let texts: Vec<&str> = claims.iter().map(|c| c.text.as_str()).collect();
        let (located, missing) = locate_claims(&spans, &texts);
        if located.is_empty() || !missing.is_empty() {
            tracing::debug!(located = located.len(), missing = missing.len(), "claims not all locatable; using full rewrite");
            return Ok(None);
        }

        let mut prompts = Vec::with_capacity(located.len());
        for (si, cis) in &located {
            let (left, right) = window_context(&spans, *si, &self.window);
            let cs: Vec<&ProblematicClaim> = cis.iter().map(|ci| &claims[*ci]).collect();
            prompts.push(sentence_prompt(req, &spans[*si].text, &left, &right, &cs)?);
        }
        let outs = self.llm.chat_many(prompts).await.map_err(CollaboratorError::from_transport)?;
        if outs.len() != located.len() {
            return Err(CollaboratorError::Malformed(format!("expected {} rewrites, got {}", located.len(), outs.len())));
        }

        let edits = located.keys().zip(outs).filter_map(|(si, out)| {
            let rewritten = strip_fences(&out).trim().to_string();
            let span = &spans[*si];
            (!rewritten.is_empty()).then(|| (span.start, span.end, rewritten))
        }).collect::<Vec<_>>();
        Ok(Some(splice(text, edits)))
    }

    async fn rewrite_full(&self, req: &CheckRequest, text: &str, claims: &[ProblematicClaim]) -> Result<String, CollaboratorError> {
        let cs: Vec<&ProblematicClaim> = claims.iter().collect();
        let out = self.llm.chat(full_prompt(req, text, &cs)?).await.map_err(CollaboratorError::from_transport)?;
        Ok(strip_fences(&out).trim().to_string())
    }
}

#[async_trait::async_trait]
impl Reviser for LlmReviser {
    async fn revise(&self, req: &CheckRequest, text: &str, claims: &[ProblematicClaim]) -> Result<String, CollaboratorError> {
        let revised = match self.rewrite_sentences(req, text, claims).await? {
            Some(t) if t != text => t,
            _ => self.rewrite_full(req, text, claims).await?,
        };
        check_length(text, &revised)?;
        Ok(revised)
    }
}
