//! Batched, cached, normalized embedding.
//!
//! The [`Embedder`] sits between the pipeline and an
//! [`EmbeddingProvider`]. For each call it:
//!
//! 1. looks every text up in the shared [`EmbeddingCache`],
//! 2. de-duplicates the misses (first occurrence wins),
//! 3. sends them to the provider in batches of at most `batch_size`,
//! 4. checks count and width, L2-normalizes, and caches each completed
//!    batch before starting the next one.
//!
//! A batch is cached only after the provider returned every vector of it,
//! so a cancelled or failed call never leaves partial results behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use talk_to_docs_core::cache::EmbeddingCache;
use talk_to_docs_core::embedding::{is_unit, normalize, EmbeddingProvider};
use talk_to_docs_core::{Error, Result};

use crate::config::EmbeddingConfig;
use crate::embedding;

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    batch_size: usize,
    /// Upper bound on a single provider call.
    call_timeout: Option<Duration>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Arc<EmbeddingCache>, batch_size: usize) -> Self {
        Self {
            provider,
            cache,
            batch_size: batch_size.max(1),
            call_timeout: None,
        }
    }

    /// Build the provider named in `config` with a fresh cache.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let provider = embedding::create_provider(config)?;
        Ok(Self::new(
            provider,
            Arc::new(EmbeddingCache::new(config.cache_capacity)),
            config.batch_size,
        )
        .with_call_timeout(config.call_deadline()))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Embed `texts`, returning one unit vector per input in input order.
    ///
    /// # Errors
    ///
    /// - [`Error::EmbeddingFailure`] if the provider fails or returns the
    ///   wrong number of vectors.
    /// - [`Error::DimensionMismatch`] if a vector has the wrong width.
    /// - [`Error::Timeout`] if a provider call exceeds the call timeout.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cached = self.cache.get_many(texts);

        let mut seen = HashSet::new();
        let misses: Vec<String> = texts
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .filter(|(text, _)| seen.insert(text.as_str()))
            .map(|(text, _)| text.clone())
            .collect();

        tracing::debug!(
            total = texts.len(),
            misses = misses.len(),
            model = self.model_name(),
            "embedding texts"
        );

        let mut fresh: HashMap<&str, Vec<f32>> = HashMap::with_capacity(misses.len());
        for batch in misses.chunks(self.batch_size) {
            let vectors = self.embed_uncached(batch).await?;
            self.cache
                .insert_many(batch.iter().cloned().zip(vectors.iter().cloned()));
            fresh.extend(batch.iter().map(String::as_str).zip(vectors));
        }

        texts
            .iter()
            .zip(cached)
            .map(|(text, hit)| match hit {
                Some(vector) => Ok(vector),
                None => fresh
                    .get(text.as_str())
                    .cloned()
                    .ok_or_else(|| Error::embedding(format!("no vector produced for input '{}'", preview(text)))),
            })
            .collect()
    }

    /// [`embed_batch`](Self::embed_batch) under an overall deadline.
    ///
    /// Batches finished before the deadline stay cached; the batch in
    /// flight when it expires is discarded.
    pub async fn embed_batch_with_timeout(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        tokio::time::timeout(timeout, self.embed_batch(texts))
            .await
            .map_err(|_| Error::Timeout {
                operation: "embed_batch",
                millis: timeout.as_millis(),
            })?
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("empty embedding response"))
    }

    async fn embed_uncached(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.provider.embed_batch(batch);
        let vectors = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| Error::Timeout {
                operation: "embedding provider call",
                millis: limit.as_millis(),
            })??,
            None => call.await?,
        };

        if vectors.len() != batch.len() {
            return Err(Error::embedding(format!(
                "provider {} returned {} vectors for {} texts",
                self.model_name(),
                vectors.len(),
                batch.len()
            )));
        }

        let dims = self.dims();
        vectors
            .into_iter()
            .zip(batch)
            .map(|(mut v, text)| {
                if v.len() != dims {
                    return Err(Error::DimensionMismatch {
                        expected: dims,
                        actual: v.len(),
                    });
                }
                normalize(&mut v);
                // Zero or non-finite vectors cannot be scaled to unit length.
                if !is_unit(&v) {
                    return Err(Error::embedding(format!(
                        "provider {} returned a vector that cannot be normalized for input '{}'",
                        self.model_name(),
                        preview(text)
                    )));
                }
                Ok(v)
            })
            .collect()
    }
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use crate::embedding::HashProvider;
    use talk_to_docs_core::embedding::l2_norm;

    /// Records every batch it receives.
    struct Recorder {
        dims: usize,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Recorder {
        fn new(dims: usize) -> Arc<Self> {
            Arc::new(Self {
                dims,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().push(texts.to_vec());
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![1.0; self.dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    struct ShortChanger;

    #[async_trait]
    impl EmbeddingProvider for ShortChanger {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0; 4]).collect())
        }
    }

    struct WrongWidth;

    #[async_trait]
    impl EmbeddingProvider for WrongWidth {
        fn model_name(&self) -> &str {
            "wide"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; 5]).collect())
        }
    }

    /// Returns the zero vector for every input.
    struct Silent;

    #[async_trait]
    impl EmbeddingProvider for Silent {
        fn model_name(&self) -> &str {
            "silent"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let recorder = Recorder::new(3);
        let embedder = Embedder::new(recorder.clone(), Arc::new(EmbeddingCache::new(100)), 2);
        let out = embedder
            .embed_batch(&strings(&["a", "bb", "ccc", "dddd", "eeeee"]))
            .await
            .unwrap();
        assert_eq!(out.len(), 5);
        let calls = recorder.calls.lock();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|batch| batch.len() <= 2));
    }

    #[tokio::test]
    async fn test_duplicates_embedded_once() {
        let recorder = Recorder::new(3);
        let embedder = Embedder::new(recorder.clone(), Arc::new(EmbeddingCache::new(0)), 8);
        let out = embedder.embed_batch(&strings(&["x", "y", "x"])).await.unwrap();
        assert_eq!(out[0], out[2]);
        assert_eq!(recorder.calls.lock()[0], strings(&["x", "y"]));
    }

    #[tokio::test]
    async fn test_outputs_are_unit_vectors() {
        let embedder = Embedder::new(Recorder::new(8), Arc::new(EmbeddingCache::new(10)), 4);
        for v in embedder.embed_batch(&strings(&["one", "three"])).await.unwrap() {
            assert!(is_unit(&v));
        }
    }

    #[tokio::test]
    async fn test_warm_cache_skips_provider() {
        let recorder = Recorder::new(3);
        let embedder = Embedder::new(recorder.clone(), Arc::new(EmbeddingCache::new(10)), 4);
        let cold = embedder.embed_query("hello").await.unwrap();
        let warm = embedder.embed_query("hello").await.unwrap();
        assert_eq!(cold, warm);
        assert_eq!(recorder.calls.lock().len(), 1);
        assert_eq!(embedder.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_wrong_count_is_embedding_failure() {
        let embedder = Embedder::new(Arc::new(ShortChanger), Arc::new(EmbeddingCache::new(10)), 4);
        let err = embedder.embed_batch(&strings(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailure(_)));
        assert!(embedder.cache().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_width_is_dimension_mismatch() {
        let embedder = Embedder::new(Arc::new(WrongWidth), Arc::new(EmbeddingCache::new(10)), 4);
        let err = embedder.embed_query("a").await.unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let recorder = Recorder::new(3);
        let embedder = Embedder::new(recorder.clone(), Arc::new(EmbeddingCache::new(10)), 4);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_zero_vector_is_rejected_and_not_cached() {
        let embedder = Embedder::new(Arc::new(Silent), Arc::new(EmbeddingCache::new(10)), 4);
        let err = embedder.embed_query("anything").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailure(_)));
        assert!(embedder.cache().is_empty());
    }

    #[tokio::test]
    async fn test_symbol_only_text_embeds_to_unit_vector() {
        let provider = Arc::new(HashProvider::new(64).unwrap());
        let embedder = Embedder::new(provider, Arc::new(EmbeddingCache::new(10)), 4);
        for text in ["----- | ----- | -----", "***", "| --- |"] {
            let v = embedder.embed_query(text).await.unwrap();
            assert!(is_unit(&v), "norm of {:?} was {}", text, l2_norm(&v));
        }
    }
}
