use anyhow::Result;
use async_openai::types::ChatCompletionRequestMessage;

pub mod openai;

pub use openai::CompletionTimeout;

#[async_trait::async_trait]
pub trait Llm: Send + Sync {
    /// Run every prompt and return the completions in prompt order.
    async fn chat_many(&self, prompts: Vec<Vec<ChatCompletionRequestMessage>>) -> Result<Vec<String>>;

    async fn chat(&self, prompt: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        self.chat_many(vec![prompt])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty completion batch"))
    }
}
