//! # Talk to Docs
//!
//! Ask questions about your own documents. Talk to Docs chunks uploaded
//! files, embeds the chunks, keeps them in a persistent vector index, and
//! answers questions with a language model grounded in the most relevant
//! passages, citing them as `[n]`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Clean+Chunk+Embed  │──▶│ VectorIndex │──▶ SQLite artifact
//! │ txt/pdf… │   │  (batched, cached) │   │  (in-memory)│
//! └──────────┘   └────────────────────┘   └──────┬──────┘
//!                                                │
//!                        question ─▶ Retriever ◀─┘
//!                                        │
//!                                        ▼
//!                                 AnswerAssembler ─▶ primary model
//!                                        │              │ failing
//!                                        ▼              ▼
//!                                     Answer ◀──── fallback
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ttd ingest ./docs                 # index every supported file
//! ttd search "deployment steps"     # show the best-matching passages
//! ttd ask "How do I deploy?"        # grounded answer with citations
//! ttd stats                         # what's indexed
//! ttd reset                         # drop everything
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Embedding providers (hash, OpenAI, Ollama, fastembed) |
//! | [`embedder`] | Batched, cached, normalized embedding |
//! | [`generation`] | Generation providers (OpenAI, Ollama, disabled) |
//! | [`index_store`] | Index artifact persistence |
//! | [`retrieve`] | Query-time retrieval |
//! | [`answer`] | Retry/fallback answer assembly |
//! | [`ingest`] | Document ingestion |
//! | [`loader`] | File validation and loading |
//! | [`engine`] | The assembled pipeline |
//!
//! Pure logic (chunking, the cache, the index, prompts) lives in the
//! `talk-to-docs-core` crate.

pub mod answer;
pub mod config;
pub mod db;
pub mod embedder;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod generation;
pub mod index_store;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod retrieve;
pub mod stats;

pub use engine::Engine;
