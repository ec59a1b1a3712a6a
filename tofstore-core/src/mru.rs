//! Most-recently-used cache of materialised histograms.
//!
//! Entries are keyed by the owning list's workspace index and the binning
//! fingerprint. A single mutex guards the bookkeeping; histogram generation
//! happens outside the lock.

use crate::histogram::{BinEdges, Histogram};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of cached histograms per workspace.
pub const DEFAULT_MRU_CAPACITY: usize = 50;

/// Cache key: list identity plus binning identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Workspace index of the list.
    pub list: usize,
    /// Fingerprint of the bin edges.
    pub binning: u64,
}

impl CacheKey {
    /// Builds the key for `list` binned on `edges`.
    #[must_use]
    pub fn new(list: usize, edges: &BinEdges) -> Self {
        Self {
            list,
            binning: edges.fingerprint(),
        }
    }
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MruStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required a recomputation.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    edges: Arc<BinEdges>,
    histogram: Arc<Histogram>,
}

#[derive(Debug, Default)]
struct MruState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Front is the most recently used key.
    order: VecDeque<CacheKey>,
    stats: MruStats,
}

impl MruState {
    fn touch(&mut self, key: CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        self.order.push_front(key);
    }
}

/// Bounded, thread-safe histogram cache shared by all lists of a workspace.
#[derive(Debug)]
pub struct HistogramMru {
    capacity: usize,
    state: Mutex<MruState>,
}

impl Default for HistogramMru {
    fn default() -> Self {
        Self::new(DEFAULT_MRU_CAPACITY)
    }
}

impl HistogramMru {
    /// Creates a cache holding at most `capacity` histograms.
    ///
    /// A capacity of zero disables caching.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(MruState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MruState> {
        // updates never leave the map half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up the histogram of `list` binned on `edges`.
    pub fn get(&self, list: usize, edges: &BinEdges) -> Option<Arc<Histogram>> {
        let key = CacheKey::new(list, edges);
        let mut state = self.lock();
        let found = state
            .entries
            .get(&key)
            .filter(|entry| *entry.edges == *edges)
            .map(|entry| Arc::clone(&entry.histogram));
        if found.is_some() {
            state.stats.hits += 1;
            state.touch(key);
        } else {
            state.stats.misses += 1;
        }
        found
    }

    /// Stores the histogram of `list` binned on `edges`, evicting the least
    /// recently used entry when full.
    pub fn put(&self, list: usize, edges: Arc<BinEdges>, histogram: Arc<Histogram>) {
        if self.capacity == 0 {
            return;
        }
        let key = CacheKey::new(list, &edges);
        let mut state = self.lock();
        let fresh = !state.entries.contains_key(&key);
        if fresh && state.entries.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_back() {
                state.entries.remove(&oldest);
                state.stats.evictions += 1;
                log::trace!(
                    "evicted histogram for list {} (binning {:#x})",
                    oldest.list,
                    oldest.binning
                );
            }
        }
        state.entries.insert(key, CacheEntry { edges, histogram });
        state.touch(key);
    }

    /// Drops every entry belonging to `list`.
    pub fn remove_list(&self, list: usize) {
        let mut state = self.lock();
        state.entries.retain(|key, _| key.list != list);
        state.order.retain(|key| key.list != list);
    }

    /// Drops all entries. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Number of cached histograms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached histograms.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> MruStats {
        self.lock().stats
    }
}
