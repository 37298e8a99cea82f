//! C6 — Dependency Graph Cache.
//!
//! An LRU cache mapping a sorted set of facet kinds to either a cached
//! topological order or a cached `ErrCycle`. `spark-core` doesn't have a
//! build-time dependency graph (its DI story is static, via `spark-macros`
//! service wiring), so this follows spec §4.6 directly; the LRU itself is
//! borrowed from the `lru` crate the way `knhk`'s workspace dependencies use
//! it for its own caches.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::facet::FacetKind;

/// A cached `Verify` outcome for one set of facet kinds: either the
/// resolved topological order, or the participants of a cycle that made
/// resolution impossible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CachedPlan {
    Order(Vec<FacetKind>),
    Cycle(Vec<FacetKind>),
}

/// Builds the cache key: facet kinds sorted lexicographically and
/// comma-joined (spec §4.6 "Key").
pub fn cache_key(kinds: &[FacetKind]) -> String {
    let mut sorted: Vec<&str> = kinds.iter().map(FacetKind::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

const DEFAULT_CAPACITY: usize = 100;

/// C6 — bounded LRU cache from a sorted facet-kind-set key to a
/// [`CachedPlan`]. Every `get` counts as a use and moves the entry to
/// most-recently-used (spec §5 "every `Get` is a write").
pub struct DependencyGraphCache {
    inner: Mutex<LruCache<String, CachedPlan>>,
}

impl DependencyGraphCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedPlan> {
        self.inner.lock().get(key).cloned()
    }

    pub fn set(&self, key: String, plan: CachedPlan) {
        self.inner.lock().put(key, plan);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DependencyGraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
