use async_openai::error::{ApiError, OpenAIError};
use thiserror::Error;

use crate::llm::CompletionTimeout;

/// Failure of a remote collaborator (checker, reviser, search). The verification
/// loop absorbs these; they only surface directly from single-shot calls.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator rate limited: {0}")]
    RateLimited(String),
    #[error("collaborator timed out: {0}")]
    Timeout(String),
    #[error("malformed collaborator response: {0}")]
    Malformed(String),
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, CollaboratorError::Malformed(_) | CollaboratorError::Rejected(_))
    }

    /// Classify a transport error coming out of the LLM client.
    pub fn from_transport(err: anyhow::Error) -> Self {
        let msg = format!("{err:#}");
        if err.downcast_ref::<CompletionTimeout>().is_some() {
            return CollaboratorError::Timeout(msg);
        }
        match err.downcast_ref::<OpenAIError>() {
            Some(OpenAIError::Reqwest(e)) if e.is_timeout() => CollaboratorError::Timeout(msg),
            Some(OpenAIError::Reqwest(e)) if e.status().map(|s| s.as_u16()) == Some(429) => CollaboratorError::RateLimited(msg),
            Some(OpenAIError::ApiError(api)) => classify_api_error(api, msg),
            Some(OpenAIError::JSONDeserialize(_)) => CollaboratorError::Malformed(msg),
            Some(OpenAIError::InvalidArgument(_)) => CollaboratorError::Rejected(msg),
            _ => CollaboratorError::Unavailable(msg),
        }
    }
}

fn classify_api_error(api: &ApiError, msg: String) -> CollaboratorError {
    let code = api.code.as_ref().and_then(|c| c.as_str());
    match (api.r#type.as_deref(), code) {
        (_, Some("rate_limit_exceeded")) | (Some("requests" | "tokens"), _) => CollaboratorError::RateLimited(msg),
        (Some("server_error"), _) => CollaboratorError::Unavailable(msg),
        // invalid_request_error, insufficient_quota, auth failures: retrying will not help
        _ => CollaboratorError::Rejected(msg),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("pass threshold must be within [0, 1], got {0}")]
    Threshold(f64),
    #[error("max iterations must be at least 1")]
    Iterations,
    #[error("unknown verification level: {0}")]
    Level(String),
}
