//! Configuration parsing and validation.
//!
//! Talk to Docs is configured with a TOML file (default
//! `./config/ttd.toml`). Every section is optional and every key has a
//! default, so an empty file is a valid configuration: a hashing
//! embedder, no generation provider (answers come from the fallback
//! path) and an index stored under `./data/`.
//!
//! ```toml
//! [index]
//! path = "./data/index.sqlite"
//! auto_persist = true
//!
//! [chunking]
//! chunk_size = 700
//! chunk_overlap = 120
//!
//! [retrieval]
//! top_k = 5
//! score_threshold = 0.30
//! max_chunks_per_doc = 3
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```
//!
//! [`load_config`] rejects invalid values up front; nothing downstream
//! re-validates them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use talk_to_docs_core::{chunk, Error};

use crate::embedding;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Write the index artifact after every successful ingestion.
    #[serde(default = "default_true")]
    pub auto_persist: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            auto_persist: true,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    700
}
fn default_chunk_overlap() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Inclusive lower bound on similarity.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default)]
    pub max_chunks_per_doc: Option<usize>,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            max_chunks_per_doc: None,
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_score_threshold() -> f32 {
    0.30
}
fn default_candidate_multiplier() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum cached vectors; `0` disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            cache_capacity: default_cache_capacity(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_cache_capacity() -> usize {
    4096
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Limit on a single HTTP request to the provider.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Limit on one whole provider call: every attempt may use its full
    /// request timeout, plus every backoff between attempts, plus one
    /// second for decoding the final response.
    pub fn call_deadline(&self) -> Duration {
        let backoff: Duration = (1..=self.max_retries).map(embedding::retry_delay).sum();
        self.request_timeout() * (self.max_retries + 1) + backoff + Duration::from_secs(1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_retries: default_generation_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            timeout_secs: default_generation_timeout_secs(),
            max_context_chars: default_max_context_chars(),
            fallback_enabled: true,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_generation_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    8000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_max_context_chars() -> usize {
    12_000
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_max_file_size_mb() -> u64 {
    10
}

impl IngestConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Check every cross-field constraint.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] naming the offending key.
    pub fn validate(&self) -> Result<(), Error> {
        chunk::validate(self.chunking.chunk_size, self.chunking.chunk_overlap)?;

        if self.retrieval.top_k == 0 {
            return Err(Error::invalid_config("retrieval.top_k must be >= 1"));
        }
        if !self.retrieval.score_threshold.is_finite() {
            return Err(Error::invalid_config(
                "retrieval.score_threshold must be a finite number",
            ));
        }
        if self.retrieval.max_chunks_per_doc == Some(0) {
            return Err(Error::invalid_config(
                "retrieval.max_chunks_per_doc must be >= 1 when set",
            ));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(Error::invalid_config(
                "retrieval.candidate_multiplier must be >= 1",
            ));
        }

        let embedding = &self.embedding;
        if embedding.batch_size == 0 {
            return Err(Error::invalid_config("embedding.batch_size must be >= 1"));
        }
        if embedding.timeout_secs == 0 {
            return Err(Error::invalid_config("embedding.timeout_secs must be >= 1"));
        }
        if embedding.dims == Some(0) {
            return Err(Error::invalid_config("embedding.dims must be > 0"));
        }
        match embedding.provider.as_str() {
            "hash" | "local" => {}
            "openai" | "ollama" => {
                if embedding.model.is_none() {
                    return Err(Error::invalid_config(format!(
                        "embedding.model must be specified when provider is '{}'",
                        embedding.provider
                    )));
                }
                if embedding.dims.is_none() {
                    return Err(Error::invalid_config(format!(
                        "embedding.dims must be specified when provider is '{}'",
                        embedding.provider
                    )));
                }
            }
            other => {
                return Err(Error::invalid_config(format!(
                    "unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
                    other
                )))
            }
        }

        let generation = &self.generation;
        match generation.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if generation.model.is_none() {
                    return Err(Error::invalid_config(format!(
                        "generation.model must be specified when provider is '{}'",
                        generation.provider
                    )));
                }
            }
            other => {
                return Err(Error::invalid_config(format!(
                    "unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
                    other
                )))
            }
        }
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(Error::invalid_config(
                "generation.temperature must be in [0.0, 2.0]",
            ));
        }
        if generation.backoff_multiplier.is_nan() || generation.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config(
                "generation.backoff_multiplier must be >= 1.0",
            ));
        }
        if generation.max_backoff_ms < generation.initial_backoff_ms {
            return Err(Error::invalid_config(
                "generation.max_backoff_ms must be >= generation.initial_backoff_ms",
            ));
        }
        if generation.timeout_secs == 0 {
            return Err(Error::invalid_config("generation.timeout_secs must be >= 1"));
        }
        if generation.max_context_chars == 0 {
            return Err(Error::invalid_config(
                "generation.max_context_chars must be >= 1",
            ));
        }

        if self.ingest.max_file_size_mb == 0 {
            return Err(Error::invalid_config("ingest.max_file_size_mb must be >= 1"));
        }

        Ok(())
    }
}

/// Parse a configuration from TOML text and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}
