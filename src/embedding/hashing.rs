//! Offline embeddings using feature hashing.
//!
//! Each token is hashed into one of `dims` buckets and the bucket counts
//! form the vector. No vocabulary, no model download, no network: the
//! same text always produces the same vector on every machine, which
//! makes this the default provider and the one the test suite relies on.
//!
//! Buckets come from SHA-256 rather than `DefaultHasher`, whose output is
//! not guaranteed across Rust releases; persisted indexes must stay
//! searchable after a toolchain upgrade.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use talk_to_docs_core::embedding::EmbeddingProvider;
use talk_to_docs_core::{Error, Result};

pub const DEFAULT_DIMS: usize = 256;

const BLANK_TOKEN: &str = "\u{2400}";

/// Deterministic bag-of-words embedder.
pub struct HashProvider {
    dims: usize,
    model_name: String,
}

impl HashProvider {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(Error::invalid_config("hash embedding dims must be > 0"));
        }
        Ok(Self {
            dims,
            model_name: format!("hash-{}", dims),
        })
    }

    /// Term-frequency vector for `text`. Not normalized, but never zero:
    /// text without alphanumeric words is hashed by its raw symbol runs,
    /// and blank text lands in a single fixed bucket.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut tf = vec![0.0f32; self.dims];
        let mut words = tokens(text).peekable();
        if words.peek().is_some() {
            for token in words {
                tf[self.bucket(&token)] += 1.0;
            }
            return tf;
        }

        let mut symbols = text.split_whitespace().peekable();
        if symbols.peek().is_none() {
            tf[self.bucket(BLANK_TOKEN)] = 1.0;
            return tf;
        }
        for run in symbols {
            tf[self.bucket(run)] += 1.0;
        }
        tf
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dims as u64) as usize
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talk_to_docs_core::embedding::{cosine_similarity, l2_norm};

    #[test]
    fn test_same_text_same_vector() {
        let p = HashProvider::new(64).unwrap();
        assert_eq!(p.embed_one("Hello, world"), p.embed_one("hello world!"));
    }

    #[test]
    fn test_symbol_only_text_is_not_zero() {
        let p = HashProvider::new(32).unwrap();
        let rule = p.embed_one("----- | ----- | -----");
        assert!(l2_norm(&rule) > 0.0);
        assert_ne!(rule, p.embed_one("*** *** ***"));
        assert!(l2_norm(&p.embed_one("   ")) > 0.0);
        assert!(l2_norm(&p.embed_one("")) > 0.0);
    }

    #[test]
    fn test_words_ignore_surrounding_symbols() {
        let p = HashProvider::new(32).unwrap();
        assert_eq!(p.embed_one("| alpha | beta |"), p.embed_one("alpha beta"));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let p = HashProvider::new(DEFAULT_DIMS).unwrap();
        let q = p.embed_one("What is the capital of France?");
        let near = p.embed_one("The capital of France is Paris.");
        let far = p.embed_one("Bananas grow on tall plants.");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_zero_dims_rejected() {
        assert!(HashProvider::new(0).is_err());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let p = HashProvider::new(16).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let out = p.embed_batch(&texts).await.unwrap();
        assert_eq!(out[0], p.embed_one("alpha"));
        assert_eq!(out[1], p.embed_one("beta"));
        assert_eq!(p.model_name(), "hash-16");
    }
}
