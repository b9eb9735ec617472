//! In-memory vector index with exact inner-product search.
//!
//! Entries live in insertion order behind a `parking_lot::RwLock`, so
//! concurrent searches share a read lock while `add`, `add_batch` and
//! `reset` take the write lock. A search therefore always observes a
//! whole snapshot: either before or after a document's entries were
//! published, and either before or after a reset.
//!
//! Vectors are expected to be unit length, which makes the inner product
//! equal to cosine similarity. Search is brute force; a linear scan over a
//! few hundred thousand 384-d vectors stays well under interactive
//! latency.
//!
//! Persistence lives in the app crate; this module exposes
//! [`VectorIndex::snapshot`] and [`VectorIndex::from_entries`] so the
//! artifact writer can round-trip entries in their original order.

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::embedding::dot;
use crate::error::{Error, Result};
use crate::models::{ChunkMetadata, IndexEntry, SearchHit};

#[derive(Default)]
struct IndexState {
    /// Insertion order is the tie-break order.
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

/// Fixed-dimension vector index keyed by chunk id.
pub struct VectorIndex {
    dims: usize,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index for vectors of width `dims`.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Rebuild an index from entries in their original insertion order.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] or [`Error::DuplicateEntry`] if the
    /// entries violate the index invariants.
    pub fn from_entries(dims: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        let index = Self::new(dims);
        index.add_batch(entries)?;
        Ok(index)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of stored entries.
    pub fn size(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.state.read().positions.contains_key(chunk_id)
    }

    /// Insert a single entry.
    pub fn add(&self, chunk_id: &str, vector: Vec<f32>, metadata: ChunkMetadata) -> Result<()> {
        self.add_batch(vec![IndexEntry {
            chunk_id: chunk_id.to_string(),
            vector,
            metadata,
        }])
    }

    /// Insert several entries as one unit.
    ///
    /// Every entry is validated before any is published; on error the
    /// index is unchanged.
    pub fn add_batch(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut state = self.state.write();

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            self.check_dims(&entry.vector)?;
            if state.positions.contains_key(&entry.chunk_id)
                || !seen.insert(entry.chunk_id.as_str())
            {
                return Err(Error::DuplicateEntry(entry.chunk_id.clone()));
            }
        }

        for entry in entries {
            let position = state.entries.len();
            state.positions.insert(entry.chunk_id.clone(), position);
            state.entries.push(entry);
        }
        Ok(())
    }

    /// Return up to `k` entries most similar to `query`.
    ///
    /// Results are sorted by descending score; equal scores keep insertion
    /// order (earliest first). An empty index or `k == 0` yields an empty
    /// result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_dims(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, dot(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| {
                let entry = &state.entries[position];
                SearchHit {
                    chunk_id: entry.chunk_id.clone(),
                    score,
                    metadata: entry.metadata.clone(),
                }
            })
            .collect())
    }

    /// Remove every entry. This is the only deletion path.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.positions.clear();
    }

    /// Replace the whole contents with `other`'s, atomically for readers.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `other` has a different width.
    pub fn replace_with(&self, other: VectorIndex) -> Result<()> {
        if other.dims != self.dims {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: other.dims,
            });
        }
        let incoming = other.state.into_inner();
        *self.state.write() = incoming;
        Ok(())
    }

    /// Clone all entries in insertion order.
    pub fn snapshot(&self) -> Vec<IndexEntry> {
        self.state.read().entries.clone()
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::normalize;
    use std::sync::Arc;

    fn meta(text: &str) -> ChunkMetadata {
        ChunkMetadata {
            document_id: "doc1".to_string(),
            source_name: "notes.txt".to_string(),
            sequence_index: 0,
            start_offset: 0,
            end_offset: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        normalize(&mut v);
        v
    }

    #[test]
    fn test_search_sorted_descending() {
        let index = VectorIndex::new(2);
        index.add("a", unit(&[1.0, 0.0]), meta("a")).unwrap();
        index.add("b", unit(&[0.0, 1.0]), meta("b")).unwrap();
        index.add("c", unit(&[1.0, 1.0]), meta("c")).unwrap();

        let hits = index.search(&unit(&[1.0, 0.2]), 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let index = VectorIndex::new(3);
        let v = unit(&[0.2, 0.3, 0.9]);
        index.add("first", v.clone(), meta("same")).unwrap();
        index.add("other", unit(&[-1.0, 0.0, 0.0]), meta("x")).unwrap();
        index.add("second", v.clone(), meta("same")).unwrap();

        let hits = index.search(&v, 2).unwrap();
        assert_eq!(hits[0].chunk_id, "first");
        assert_eq!(hits[1].chunk_id, "second");
        assert_eq!(hits[0].score, hits[1].score);
    }

    #[test]
    fn test_k_limits_results() {
        let index = VectorIndex::new(2);
        for i in 0..10 {
            index
                .add(&format!("c{}", i), unit(&[1.0, i as f32]), meta("t"))
                .unwrap();
        }
        assert_eq!(index.search(&unit(&[1.0, 0.0]), 4).unwrap().len(), 4);
        assert!(index.search(&unit(&[1.0, 0.0]), 0).unwrap().is_empty());
        assert_eq!(index.search(&unit(&[1.0, 0.0]), 50).unwrap().len(), 10);
    }

    #[test]
    fn test_dimension_mismatch_on_add_and_search() {
        let index = VectorIndex::new(3);
        let err = index.add("a", vec![1.0, 0.0], meta("a")).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        let err = index.search(&[1.0], 1).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_duplicate_chunk_rejected() {
        let index = VectorIndex::new(2);
        index.add("a", unit(&[1.0, 0.0]), meta("a")).unwrap();
        let err = index.add("a", unit(&[0.0, 1.0]), meta("a")).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry(_)));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_add_batch_is_all_or_nothing() {
        let index = VectorIndex::new(2);
        let entries = vec![
            IndexEntry {
                chunk_id: "ok".to_string(),
                vector: unit(&[1.0, 0.0]),
                metadata: meta("ok"),
            },
            IndexEntry {
                chunk_id: "bad".to_string(),
                vector: vec![1.0, 0.0, 0.0],
                metadata: meta("bad"),
            },
        ];
        assert!(index.add_batch(entries).is_err());
        assert!(index.is_empty());
        assert!(!index.contains("ok"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let index = VectorIndex::new(2);
        index.add("a", unit(&[1.0, 0.0]), meta("a")).unwrap();
        index.reset();
        assert_eq!(index.size(), 0);
        assert!(index.search(&unit(&[1.0, 0.0]), 5).unwrap().is_empty());
        // Ids are free again after a reset.
        index.add("a", unit(&[1.0, 0.0]), meta("a")).unwrap();
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_order() {
        let index = VectorIndex::new(2);
        let v = unit(&[1.0, 1.0]);
        index.add("x", v.clone(), meta("x")).unwrap();
        index.add("y", v.clone(), meta("y")).unwrap();
        let rebuilt = VectorIndex::from_entries(2, index.snapshot()).unwrap();
        assert_eq!(index.search(&v, 2).unwrap(), rebuilt.search(&v, 2).unwrap());
    }

    #[test]
    fn test_replace_with_checks_dims() {
        let index = VectorIndex::new(2);
        assert!(index.replace_with(VectorIndex::new(3)).is_err());
        let other = VectorIndex::new(2);
        other.add("z", unit(&[0.0, 1.0]), meta("z")).unwrap();
        index.replace_with(other).unwrap();
        assert!(index.contains("z"));
    }

    #[test]
    fn test_search_sees_whole_batches_under_concurrency() {
        let index = Arc::new(VectorIndex::new(2));
        let writer = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for round in 0..50 {
                    let batch = (0..4)
                        .map(|i| IndexEntry {
                            chunk_id: format!("r{}-{}", round, i),
                            vector: unit(&[1.0, i as f32]),
                            metadata: meta("t"),
                        })
                        .collect();
                    index.add_batch(batch).unwrap();
                    if round % 10 == 9 {
                        index.reset();
                    }
                }
            })
        };
        for _ in 0..200 {
            let hits = index.search(&unit(&[1.0, 0.0]), usize::MAX).unwrap();
            assert_eq!(hits.len() % 4, 0, "observed a partially published batch");
        }
        writer.join().unwrap();
    }
}
