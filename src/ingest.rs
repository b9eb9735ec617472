//! Document ingestion.
//!
//! Drives one document through clean → chunk → embed → index → persist.
//! Every chunk of the document is embedded before anything touches the
//! index, and the entries are then published with a single
//! [`VectorIndex::add_batch`], so a document is either fully searchable
//! or not present at all. A failure at any step leaves the index exactly
//! as it was.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use talk_to_docs_core::chunk;
use talk_to_docs_core::clean::clean_text;
use talk_to_docs_core::index::VectorIndex;
use talk_to_docs_core::models::{ChunkMetadata, Document, IndexEntry};

use crate::config::{ChunkingConfig, IngestConfig};
use crate::embedder::Embedder;
use crate::index_store::IndexStore;
use crate::loader;

/// Outcome of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub source_name: String,
    pub chunks_indexed: usize,
    pub persisted: bool,
}

pub struct Ingestor {
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    store: Option<Arc<IndexStore>>,
    chunk_size: usize,
    chunk_overlap: usize,
    max_file_bytes: u64,
}

impl Ingestor {
    pub fn new(embedder: Arc<Embedder>, index: Arc<VectorIndex>, chunking: &ChunkingConfig) -> Self {
        Self {
            embedder,
            index,
            store: None,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            max_file_bytes: IngestConfig::default().max_file_size_bytes(),
        }
    }

    /// Persist the whole index after each document.
    pub fn with_persistence(mut self, store: Arc<IndexStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_limits(mut self, ingest: &IngestConfig) -> Self {
        self.max_file_bytes = ingest.max_file_size_bytes();
        self
    }

    /// Index already-extracted text under `source_name`.
    pub async fn ingest_text(&self, source_name: &str, raw_text: &str) -> Result<IngestReport> {
        let document = Document::new(source_name, clean_text(raw_text));

        let chunks = chunk::split(&document.id, &document.raw_text, self.chunk_size, self.chunk_overlap)?;
        if chunks.is_empty() {
            bail!("No text chunks generated for {}", source_name);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("Failed to embed {}", source_name))?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                chunk_id: chunk.id.clone(),
                vector,
                metadata: ChunkMetadata::from_chunk(chunk, &document.source_name),
            })
            .collect();
        let chunks_indexed = entries.len();
        self.index
            .add_batch(entries)
            .with_context(|| format!("Failed to index {}", source_name))?;

        let persisted = match &self.store {
            Some(store) => {
                store
                    .persist(&self.index, self.embedder.model_name())
                    .await
                    .with_context(|| {
                        format!(
                            "{} was indexed in memory but the index could not be saved to {}",
                            source_name,
                            store.path().display()
                        )
                    })?;
                true
            }
            None => false,
        };

        tracing::info!(
            document_id = %document.id,
            source = %document.source_name,
            ingested_at = %document.ingested_at.to_rfc3339(),
            chunks = chunks_indexed,
            "document ingested"
        );

        Ok(IngestReport {
            document_id: document.id,
            source_name: document.source_name,
            chunks_indexed,
            persisted,
        })
    }

    /// Validate, extract and index a file.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let owned = path.to_path_buf();
        let max_bytes = self.max_file_bytes;
        let loaded = tokio::task::spawn_blocking(move || loader::load_file(&owned, max_bytes))
            .await
            .context("File loading task failed")?
            .with_context(|| format!("Failed to load {}", path.display()))?;
        self.ingest_text(&loaded.source_name, &loaded.text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talk_to_docs_core::cache::EmbeddingCache;

    use crate::embedding::HashProvider;

    fn ingestor(chunk_size: usize, overlap: usize) -> (Ingestor, Arc<VectorIndex>) {
        let embedder = Arc::new(Embedder::new(
            Arc::new(HashProvider::new(64).unwrap()),
            Arc::new(EmbeddingCache::new(100)),
            8,
        ));
        let index = Arc::new(VectorIndex::new(64));
        let chunking = ChunkingConfig {
            chunk_size,
            chunk_overlap: overlap,
        };
        (Ingestor::new(embedder, Arc::clone(&index), &chunking), index)
    }

    #[tokio::test]
    async fn test_ingest_indexes_every_chunk() {
        let (ingestor, index) = ingestor(20, 5);
        let report = ingestor
            .ingest_text("notes.txt", "alpha beta gamma delta epsilon zeta eta theta")
            .await
            .unwrap();
        assert!(report.chunks_indexed > 1);
        assert_eq!(index.size(), report.chunks_indexed);
        assert!(!report.persisted);
    }

    #[tokio::test]
    async fn test_blank_document_is_rejected() {
        let (ingestor, index) = ingestor(20, 5);
        let err = ingestor.ingest_text("blank.txt", " \n\t\u{200B} ").await.unwrap_err();
        assert!(err.to_string().contains("No text chunks"));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_persists_when_configured() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(IndexStore::new(tmp.path().join("index.sqlite")));
        let (ingestor, _index) = ingestor(50, 10);
        let ingestor = ingestor.with_persistence(Arc::clone(&store));
        let report = ingestor.ingest_text("a.txt", "some text to keep").await.unwrap();
        assert!(report.persisted);
        assert_eq!(store.read_header().await.unwrap().unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_ingest_path_rejects_unsupported_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("image.png");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();
        let (ingestor, index) = ingestor(50, 10);
        assert!(ingestor.ingest_path(&path).await.is_err());
        assert!(index.is_empty());
    }
}
