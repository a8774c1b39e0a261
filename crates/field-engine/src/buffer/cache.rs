//! LRU cache of materialized snapshots.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::Snapshot;
use crate::types::WindowStats;

/// Bounded cache of snapshots keyed by time index.
///
/// Access is single-owner (one per field), so the counters are plain integers.
pub struct SnapshotCache {
    cache: LruCache<usize, Arc<Snapshot>>,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl SnapshotCache {
    /// Create a cache holding at most `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Try to get a snapshot from the cache.
    ///
    /// Returns `Some(snapshot)` if found (cache hit), `None` if not found (cache miss).
    pub fn get(&mut self, index: usize) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.cache.get(&index) {
            self.hits += 1;
            Some(Arc::clone(snapshot))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Check if an index is resident without updating LRU order.
    pub fn contains(&self, index: usize) -> bool {
        self.cache.contains(&index)
    }

    /// Insert a snapshot, evicting the least recently used one if full.
    pub fn insert(&mut self, snapshot: Arc<Snapshot>) {
        let size = snapshot.memory_bytes();
        if let Some((_, evicted)) = self.cache.push(snapshot.index, snapshot) {
            // push returns the replaced value for an existing key as well
            self.current_memory = self.current_memory.saturating_sub(evicted.memory_bytes());
            if !self.cache.contains(&evicted.index) {
                self.evictions += 1;
            }
        }
        self.current_memory += size;
    }

    /// Evict every snapshot whose index does not satisfy `keep`.
    ///
    /// Returns the evicted indices.
    pub fn retain<F>(&mut self, keep: F) -> Vec<usize>
    where
        F: Fn(usize) -> bool,
    {
        let stale: Vec<usize> = self
            .cache
            .iter()
            .map(|(&index, _)| index)
            .filter(|&index| !keep(index))
            .collect();
        for index in &stale {
            if let Some(snapshot) = self.cache.pop(index) {
                self.current_memory = self.current_memory.saturating_sub(snapshot.memory_bytes());
                self.evictions += 1;
            }
        }
        stale
    }

    /// Resident indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.cache.iter().map(|(&index, _)| index).collect();
        indices.sort_unstable();
        indices
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get cache statistics. `loads` and `prefetch_hits` are filled in by
    /// the window.
    pub fn stats(&self) -> WindowStats {
        WindowStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            resident: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            ..Default::default()
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }
}
