// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded LRU cache for generated embeddings.
//!
//! Entries are keyed by the blake3 hash of the input text, so two inputs hit
//! the same entry only when they are byte-identical.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cache key: blake3 digest of the input text.
pub type ContentHash = [u8; 32];

/// Hashes text into a cache key.
pub fn content_hash(text: &str) -> ContentHash {
    *blake3::hash(text.as_bytes()).as_bytes()
}

/// Hit/miss counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

struct Inner {
    entries: LruCache<ContentHash, Arc<Vec<f32>>>,
    hits: u64,
    misses: u64,
}

/// Thread-safe LRU map from content hash to vector.
///
/// A capacity of zero disables caching: every lookup misses and inserts are
/// dropped.
pub struct EmbeddingCache {
    inner: Option<Mutex<Inner>>,
    capacity: usize,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|cap| {
            Mutex::new(Inner {
                entries: LruCache::new(cap),
                hits: 0,
                misses: 0,
            })
        });
        Self { inner, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up a vector and marks it most recently used.
    pub fn get(&self, key: &ContentHash) -> Option<Arc<Vec<f32>>> {
        let mut inner = self.lock()?;
        match inner.entries.get(key).cloned() {
            Some(hit) => {
                inner.hits += 1;
                Some(hit)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Inserts a vector, evicting the least recently used entry when full.
    pub fn insert(&self, key: ContentHash, vector: Arc<Vec<f32>>) {
        if let Some(mut inner) = self.lock() {
            inner.entries.put(key, vector);
        }
    }

    pub fn contains(&self, key: &ContentHash) -> bool {
        self.lock()
            .map(|inner| inner.entries.contains(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut inner) = self.lock() {
            inner.entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self.lock() {
            Some(inner) => CacheStats {
                hits: inner.hits,
                misses: inner.misses,
                len: inner.entries.len(),
                capacity: self.capacity,
            },
            None => CacheStats::default(),
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, Inner>> {
        // Entries are only ever whole vectors, so a poisoned guard is still
        // consistent.
        self.inner
            .as_ref()
            .map(|mutex| mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}
