use crate::serper::{Searcher, SerperItem};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Grounding material handed to the checker and the reviser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub context: String,
    pub sources: Vec<String>,
}

impl Evidence {
    pub fn from_hits(hits: &[SerperItem]) -> Self {
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        let mut sources = Vec::new();
        for h in hits {
            if !seen.insert(h.link.as_str()) { continue; }
            blocks.push(format!("- {} [{}]\n{}", h.title, h.link, h.snippet));
            sources.push(h.link.clone());
        }
        Self { context: blocks.join("\n"), sources }
    }

    pub fn is_empty(&self) -> bool { self.context.trim().is_empty() }
}

/// Search every query and merge the hits in query order. Failed searches are skipped.
pub async fn gather_context(serp: &dyn Searcher, queries: &[String], concurrency: usize) -> Evidence {
    let tasks = queries.iter().cloned().map(|q| async move {
        let r = serp.search(&q).await;
        (q, r)
    });

    let mut hits = Vec::new();
    let results = stream::iter(tasks).buffered(concurrency.max(1)).collect::<Vec<_>>().await;
    for (q, r) in results {
        match r {
            Ok(items) => hits.extend(items),
            Err(e) => tracing::warn!(query = %q, error = %e, "search failed; continuing without it"),
        }
    }
    Evidence::from_hits(&hits)
}
