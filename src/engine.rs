//! The assembled question-answering pipeline.
//!
//! [`Engine`] owns one of everything: the embedder (and its cache), the
//! shared vector index, the artifact store, the retriever, the answer
//! assembler and the ingestor. The CLI opens one per process; tests
//! build one with mock providers through [`Engine::with_components`].

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use talk_to_docs_core::generation::GenerationProvider;
use talk_to_docs_core::index::VectorIndex;
use talk_to_docs_core::models::{Answer, RetrievalResult};

use crate::answer::AnswerAssembler;
use crate::config::Config;
use crate::embedder::Embedder;
use crate::generation::create_generator;
use crate::index_store::IndexStore;
use crate::ingest::{IngestReport, Ingestor};
use crate::retrieve::Retriever;

pub struct Engine {
    config: Config,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    store: Arc<IndexStore>,
    retriever: Retriever,
    assembler: AnswerAssembler,
    ingestor: Ingestor,
}

impl Engine {
    /// Build providers from `config` and load the persisted index.
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = Embedder::from_config(&config.embedding)
            .context("Failed to create embedding provider")?;
        let generator = create_generator(&config.generation);
        Self::with_components(config, embedder, generator).await
    }

    /// Assemble the pipeline around caller-supplied providers.
    pub async fn with_components(
        config: Config,
        embedder: Embedder,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        let embedder = Arc::new(embedder);
        let store = Arc::new(IndexStore::new(config.index.path.clone()));
        let index = store
            .load(embedder.dims(), embedder.model_name())
            .await
            .with_context(|| format!("Failed to load index from {}", store.path().display()))?;
        let index = Arc::new(index);

        let retriever = Retriever::from_config(Arc::clone(&embedder), Arc::clone(&index), &config.retrieval)
            .with_embed_timeout(config.embedding.call_deadline());
        let assembler = AnswerAssembler::new(generator, &config.generation);
        let mut ingestor =
            Ingestor::new(Arc::clone(&embedder), Arc::clone(&index), &config.chunking).with_limits(&config.ingest);
        if config.index.auto_persist {
            ingestor = ingestor.with_persistence(Arc::clone(&store));
        }

        tracing::debug!(
            index = %store.path().display(),
            entries = index.size(),
            embedder = embedder.model_name(),
            generator = assembler.generator_name(),
            "engine ready"
        );

        Ok(Self {
            config,
            embedder,
            index,
            store,
            retriever,
            assembler,
            ingestor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn generator_name(&self) -> &str {
        self.assembler.generator_name()
    }

    pub async fn ingest_text(&self, source_name: &str, raw_text: &str) -> Result<IngestReport> {
        self.ingestor.ingest_text(source_name, raw_text).await
    }

    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        self.ingestor.ingest_path(path).await
    }

    /// Retrieve with explicit limits, falling back to the configured ones.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> talk_to_docs_core::Result<RetrievalResult> {
        self.retriever
            .retrieve(
                query,
                top_k.unwrap_or(self.config.retrieval.top_k),
                threshold.unwrap_or(self.config.retrieval.score_threshold),
            )
            .await
    }

    /// Retrieve context for `question` and answer it.
    pub async fn ask(
        &self,
        question: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> talk_to_docs_core::Result<Answer> {
        let retrieval = self.search(question, top_k, threshold).await?;
        self.assembler.answer(question, &retrieval).await
    }

    /// Write the in-memory index to its artifact.
    pub async fn persist(&self) -> Result<usize> {
        let written = self
            .store
            .persist(&self.index, self.embedder.model_name())
            .await
            .with_context(|| format!("Failed to save index to {}", self.store.path().display()))?;
        Ok(written)
    }

    /// Drop every indexed document, in memory and on disk.
    pub async fn reset(&self) -> Result<()> {
        self.index.reset();
        self.store
            .remove()
            .await
            .with_context(|| format!("Failed to remove {}", self.store.path().display()))?;
        tracing::info!(index = %self.store.path().display(), "index reset");
        Ok(())
    }
}
