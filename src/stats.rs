//! Index statistics.
//!
//! Summarizes what's indexed: artifact location and size, the embedding
//! model and width it was built with, and per-source document and chunk
//! counts. Used by `ttd stats`.

use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use talk_to_docs_core::index::VectorIndex;

use crate::engine::Engine;

/// Per-source breakdown of document and chunk counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub source: String,
    pub doc_count: usize,
    pub chunk_count: usize,
}

/// Group the index's entries by source name, most chunks first.
pub fn source_breakdown(index: &VectorIndex) -> Vec<SourceStats> {
    let mut by_source: BTreeMap<String, (HashSet<String>, usize)> = BTreeMap::new();
    for entry in index.snapshot() {
        let slot = by_source.entry(entry.metadata.source_name).or_default();
        slot.0.insert(entry.metadata.document_id);
        slot.1 += 1;
    }

    let mut stats: Vec<SourceStats> = by_source
        .into_iter()
        .map(|(source, (docs, chunks))| SourceStats {
            source,
            doc_count: docs.len(),
            chunk_count: chunks,
        })
        .collect();
    stats.sort_by(|a, b| b.chunk_count.cmp(&a.chunk_count).then_with(|| a.source.cmp(&b.source)));
    stats
}

/// Print a summary of the engine's index.
pub async fn run_stats(engine: &Engine) -> Result<()> {
    let store = engine.store();
    let index = engine.index();
    let header = store.read_header().await?;
    let artifact_size = std::fs::metadata(store.path()).map(|m| m.len()).unwrap_or(0);
    let sources = source_breakdown(index);
    let documents: usize = sources.iter().map(|s| s.doc_count).sum();
    let cache = engine.embedder().cache().stats();

    println!("Talk to Docs — Index Stats");
    println!("==========================");
    println!();
    println!("  Index:       {}", store.path().display());
    match &header {
        Some(h) => {
            println!("  Size:        {}", format_bytes(artifact_size));
            println!("  Format:      v{}", h.format_version);
        }
        None => println!("  Size:        (not persisted yet)"),
    }
    println!();
    println!("  Embedder:    {} ({} dims)", engine.embedder().model_name(), index.dims());
    println!("  Generator:   {}", engine.generator_name());
    println!("  Cache:       {} / {} vectors", cache.entries, cache.capacity);
    println!();
    println!("  Documents:   {}", documents);
    println!("  Chunks:      {}", index.size());

    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<40} {:>6} {:>8}", "SOURCE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(56));
        for s in &sources {
            println!("  {:<40} {:>6} {:>8}", s.source, s.doc_count, s.chunk_count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talk_to_docs_core::models::ChunkMetadata;

    fn add(index: &VectorIndex, id: &str, doc: &str, source: &str) {
        let metadata = ChunkMetadata {
            document_id: doc.to_string(),
            source_name: source.to_string(),
            sequence_index: 0,
            start_offset: 0,
            end_offset: 1,
            text: id.to_string(),
        };
        index.add(id, vec![1.0, 0.0], metadata).unwrap();
    }

    #[test]
    fn test_breakdown_groups_by_source() {
        let index = VectorIndex::new(2);
        add(&index, "c1", "d1", "guide.pdf");
        add(&index, "c2", "d1", "guide.pdf");
        add(&index, "c3", "d2", "guide.pdf");
        add(&index, "c4", "d3", "notes.txt");

        let stats = source_breakdown(&index);
        assert_eq!(
            stats[0],
            SourceStats {
                source: "guide.pdf".to_string(),
                doc_count: 2,
                chunk_count: 3
            }
        );
        assert_eq!(stats[1].source, "notes.txt");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
