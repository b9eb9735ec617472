//! Core data models used throughout Talk to Docs.
//!
//! These types represent the documents, chunks, index entries, retrieval
//! results, and answers that flow through the ingestion and question
//! answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded document after text extraction and cleaning.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source_name: String,
    pub raw_text: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with a fresh UUID, stamped now.
    pub fn new(source_name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            raw_text: raw_text.into(),
            ingested_at: Utc::now(),
        }
    }
}

/// A contiguous window of a document's cleaned text.
///
/// Offsets are character (not byte) positions, `[start_offset, end_offset)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub hash: String,
}

/// Metadata stored next to each vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub source_name: String,
    pub sequence_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

impl ChunkMetadata {
    pub fn from_chunk(chunk: &Chunk, source_name: &str) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            source_name: source_name.to_string(),
            sequence_index: chunk.sequence_index,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            text: chunk.text.clone(),
        }
    }
}

/// One `(chunk_id, vector, metadata)` row of the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A raw hit from [`VectorIndex::search`](crate::index::VectorIndex::search).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// A chunk that cleared the retriever's filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_name: String,
    pub sequence_index: usize,
    pub text: String,
    pub score: f32,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            document_id: hit.metadata.document_id,
            source_name: hit.metadata.source_name,
            sequence_index: hit.metadata.sequence_index,
            text: hit.metadata.text,
            score: hit.score,
        }
    }
}

/// Ordered retrieval output: descending score, bounded by top-k,
/// every score at or above the threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.chunks.iter().any(|c| c.chunk_id == chunk_id)
    }
}

/// Which path produced an [`Answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Primary,
    Fallback,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::Primary => write!(f, "primary"),
            GenerationMode::Fallback => write!(f, "fallback"),
        }
    }
}

/// A source reference attached to an answer. `rank` matches the `[n]`
/// marker used in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub rank: usize,
    pub chunk_id: String,
    pub source_name: String,
    pub sequence_index: usize,
    pub score: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub mode: GenerationMode,
    /// False when no retrieved context was available to ground the answer.
    pub grounded: bool,
}
