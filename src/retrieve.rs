//! Query-time retrieval: embed, search, filter, cap.
//!
//! # Pipeline
//!
//! ```text
//! query ─▶ Embedder (cached) ─▶ VectorIndex::search(fetch_k)
//!                                   │
//!                                   ▼
//!                score ≥ threshold ─▶ per-document cap ─▶ top_k
//! ```
//!
//! `fetch_k` equals `top_k` unless a per-document cap is configured, in
//! which case the retriever over-fetches by `candidate_multiplier` so
//! capped documents do not leave the result short.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use talk_to_docs_core::index::VectorIndex;
use talk_to_docs_core::models::{RetrievalResult, RetrievedChunk, SearchHit};
use talk_to_docs_core::Result;

use crate::config::RetrievalConfig;
use crate::embedder::Embedder;

pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    max_chunks_per_doc: Option<usize>,
    candidate_multiplier: usize,
    embed_timeout: Option<Duration>,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            max_chunks_per_doc: None,
            candidate_multiplier: 1,
            embed_timeout: None,
        }
    }

    pub fn from_config(embedder: Arc<Embedder>, index: Arc<VectorIndex>, config: &RetrievalConfig) -> Self {
        Self {
            max_chunks_per_doc: config.max_chunks_per_doc,
            candidate_multiplier: config.candidate_multiplier.max(1),
            ..Self::new(embedder, index)
        }
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = Some(timeout);
        self
    }

    /// Find at most `top_k` chunks scoring at least `score_threshold`
    /// against `query`, best first.
    ///
    /// A blank query, `top_k == 0`, an empty index, or nothing clearing
    /// the threshold all give an empty result rather than an error.
    pub async fn retrieve(&self, query: &str, top_k: usize, score_threshold: f32) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 || self.index.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let texts = [query.to_string()];
        let vectors = match self.embed_timeout {
            Some(timeout) => self.embedder.embed_batch_with_timeout(&texts, timeout).await?,
            None => self.embedder.embed_batch(&texts).await?,
        };
        let Some(query_vector) = vectors.into_iter().next() else {
            return Ok(RetrievalResult::default());
        };

        let fetch_k = match self.max_chunks_per_doc {
            Some(_) => top_k.saturating_mul(self.candidate_multiplier),
            None => top_k,
        };
        let hits = self.index.search(&query_vector, fetch_k)?;
        let result = select(hits, top_k, score_threshold, self.max_chunks_per_doc);

        tracing::debug!(
            query_chars = query.chars().count(),
            fetched = fetch_k,
            returned = result.len(),
            "retrieval complete"
        );
        Ok(result)
    }
}

/// Filter score-sorted `hits` down to the final result.
fn select(hits: Vec<SearchHit>, top_k: usize, threshold: f32, max_per_doc: Option<usize>) -> RetrievalResult {
    let mut per_doc: HashMap<String, usize> = HashMap::new();
    let mut chunks = Vec::with_capacity(top_k.min(hits.len()));

    for hit in hits {
        if chunks.len() == top_k {
            break;
        }
        // Sorted descending, so nothing after this can clear the bar.
        if hit.score < threshold {
            break;
        }
        if let Some(cap) = max_per_doc {
            let seen = per_doc.entry(hit.metadata.document_id.clone()).or_insert(0);
            if *seen >= cap {
                continue;
            }
            *seen += 1;
        }
        chunks.push(RetrievedChunk::from(hit));
    }

    RetrievalResult { chunks }
}
