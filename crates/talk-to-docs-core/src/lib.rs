//! # Talk to Docs Core
//!
//! Runtime-free logic for Talk to Docs: data models, the error taxonomy,
//! text cleaning, chunking, vector math, the LRU embedding cache, the
//! in-memory vector index, prompt assembly, and the provider traits.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The
//! `talk-to-docs` app crate supplies providers, persistence, and the CLI.

pub mod cache;
pub mod chunk;
pub mod clean;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;

pub use error::{Error, Result};
