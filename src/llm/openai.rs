use anyhow::{Context, Result};
use async_openai::{config::OpenAIConfig, Client, types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs}};
use futures::{stream, StreamExt};
use std::time::Duration;
use super::Llm;

/// Marker error for a completion that exceeded the client's deadline.
#[derive(Debug, thiserror::Error)]
#[error("chat completion timed out after {0:?}")]
pub struct CompletionTimeout(pub Duration);

#[derive(Clone)]
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    max_concurrency: usize,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(model: String, base_url: Option<String>, api_key: Option<String>, max_concurrency: usize) -> Self {
        let mut cfg = OpenAIConfig::default();
        if let Some(url) = base_url { cfg = cfg.with_api_base(url); }
        if let Some(key) = api_key { cfg = cfg.with_api_key(key); }
        let client = Client::with_config(cfg);
        Self { client, model, temperature: None, max_concurrency: max_concurrency.max(1), timeout: Duration::from_secs(120) }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone()).messages(messages);
        if let Some(t) = self.temperature { args.temperature(t); }
        let req = args.build()?;

        let resp = tokio::time::timeout(self.timeout, self.client.chat().create(req))
            .await
            .map_err(|_| CompletionTimeout(self.timeout))?
            .context("chat completion request failed")?;
        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Llm for LlmClient {
    async fn chat_many(&self, prompts: Vec<Vec<ChatCompletionRequestMessage>>) -> Result<Vec<String>> {
        let reqs = prompts.into_iter().enumerate().map(|(idx, messages)| async move {
            let text = self.complete(messages).await?;
            Ok::<_, anyhow::Error>((idx, text))
        });

        let mut out = stream::iter(reqs)
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        out.sort_by_key(|r| r.as_ref().map(|(i, _)| *i).unwrap_or(usize::MAX));
        let mut texts = Vec::with_capacity(out.len());
        for r in out {
            let (_, t) = r?;
            texts.push(t);
        }
        tracing::debug!(model = %self.model, completions = texts.len(), "chat batch finished");
        Ok(texts)
    }
}
