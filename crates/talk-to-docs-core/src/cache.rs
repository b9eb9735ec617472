//! Bounded least-recently-used cache of embedding vectors.
//!
//! Keyed by the exact input text. One cache instance is owned by the
//! embedder and shared (behind an `Arc`) by every ingestion and retrieval
//! operation in the process. Lookups reorder recency, so both reads and
//! writes take the same `parking_lot::Mutex`; the critical sections are
//! short map operations and never span a provider call.
//!
//! Eviction is strict LRU: each access stamps the entry with a
//! monotonically increasing tick, and the entry with the smallest tick is
//! evicted first.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

struct Slot {
    vector: Vec<f32>,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    slots: HashMap<String, Slot>,
    /// tick → key, oldest first.
    recency: BTreeMap<u64, String>,
    clock: u64,
}

impl LruState {
    fn touch(&mut self, key: &str) -> Option<&Slot> {
        self.clock += 1;
        let now = self.clock;
        let slot = self.slots.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = now;
        self.recency.insert(now, key.to_string());
        Some(slot)
    }

    fn put(&mut self, key: String, vector: Vec<f32>, capacity: usize) {
        if self.slots.contains_key(&key) {
            if let Some(slot) = self.slots.get_mut(&key) {
                slot.vector = vector;
            }
            self.touch(&key);
            return;
        }
        while self.slots.len() >= capacity {
            match self.recency.pop_first() {
                Some((_, oldest)) => {
                    self.slots.remove(&oldest);
                }
                None => break,
            }
        }
        self.clock += 1;
        self.recency.insert(self.clock, key.clone());
        self.slots.insert(
            key,
            Slot {
                vector,
                tick: self.clock,
            },
        );
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe strict-LRU map from text to embedding vector.
///
/// A capacity of zero disables caching: every lookup misses and inserts
/// are dropped.
pub struct EmbeddingCache {
    capacity: usize,
    state: Mutex<LruState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up one text, marking it most recently used on a hit.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let found = self.state.lock().touch(text).map(|slot| slot.vector.clone());
        self.record(found.is_some());
        found
    }

    /// Look up several texts under a single lock acquisition.
    pub fn get_many(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut state = self.state.lock();
        texts
            .iter()
            .map(|text| {
                let found = state.touch(text).map(|slot| slot.vector.clone());
                self.record(found.is_some());
                found
            })
            .collect()
    }

    pub fn insert(&self, text: String, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        self.state.lock().put(text, vector, self.capacity);
    }

    /// Insert a completed batch atomically with respect to other callers.
    pub fn insert_many(&self, entries: impl IntoIterator<Item = (String, Vec<f32>)>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        for (text, vector) in entries {
            state.put(text, vector, self.capacity);
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.state.lock().slots.contains_key(text)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.clear();
        state.recency.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
