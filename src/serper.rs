// src/serper.rs
use anyhow::Result;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerperItem { pub title: String, pub link: String, pub snippet: String }

#[derive(Debug, Deserialize)]
struct SerperResp {
    #[serde(default)]
    organic: Vec<SerperItem>,
}

#[async_trait::async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SerperItem>>;
}

pub struct Serper {
    http: Client,
    key: String,
    limiter: DefaultDirectRateLimiter,
    top_k: usize,
}

impl Serper {
    pub fn new(key: String, qps: u32, top_k: usize, timeout_ms: u64) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
        let qps = NonZeroU32::new(qps).unwrap_or(nonzero!(1u32));
        let limiter = RateLimiter::direct(Quota::per_second(qps));
        Ok(Self { http, key, limiter, top_k })
    }
}

#[async_trait::async_trait]
impl Searcher for Serper {
    async fn search(&self, query: &str) -> Result<Vec<SerperItem>> {
        self.limiter.until_ready().await;
        let resp = self.http
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.key)
            .json(&serde_json::json!({ "q": query, "num": self.top_k }))
            .send().await?
            .error_for_status()?
            .json::<SerperResp>().await?;
        tracing::debug!(query, hits = resp.organic.len(), "serper search");
        Ok(resp.organic.into_iter().take(self.top_k).collect())
    }
}
