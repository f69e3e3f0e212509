//! Bounded LRU cache of reconstructed slices.
//!
//! Scrolling revisits neighbouring slices constantly, so entries are keyed by
//! the native slice index a position rounds to rather than the raw position.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::enums::{Interpolation, Orientation};
use crate::reconstructor::ReconstructedSlice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub orientation: Orientation,
    pub index: usize,
    pub method: Interpolation,
    pub output_size: Option<(usize, usize)>,
}

/// Counters for observing cache behaviour.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reconstructions actually run on behalf of the cache.
    pub computations: u64,
    pub evictions: u64,
}

pub struct SliceCache {
    entries: LruCache<CacheKey, Arc<ReconstructedSlice>>,
    stats: CacheStats,
}

impl SliceCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Snap `position` onto the native slice grid of `count` planes.
    ///
    /// Returns the slice index and the position that index corresponds to.
    pub fn quantize(position: f64, count: usize) -> (usize, f64) {
        if count < 2 {
            return (0, 0.0);
        }
        let last = (count - 1) as f64;
        let index = (position.clamp(0.0, 1.0) * last).round() as usize;
        (index, index as f64 / last)
    }

    /// Return the cached slice for `key` or compute, store and return it.
    ///
    /// Errors from `compute` are passed through; neither the entries nor the
    /// counters change.
    pub fn get_or_compute<E>(
        &mut self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<ReconstructedSlice, E>,
    ) -> Result<Arc<ReconstructedSlice>, E> {
        if let Some(entry) = self.entries.get(&key) {
            self.stats.hits += 1;
            trace!(?key, "Slice cache hit");
            return Ok(Arc::clone(entry));
        }
        let slice = Arc::new(compute()?);
        self.stats.misses += 1;
        self.stats.computations += 1;
        if let Some((evicted, _)) = self.entries.push(key, Arc::clone(&slice)) {
            if evicted != key {
                self.stats.evictions += 1;
                debug!(?evicted, "Evicted slice from cache");
            }
        }
        Ok(slice)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "Clearing slice cache");
        }
        self.entries.clear();
    }
}
