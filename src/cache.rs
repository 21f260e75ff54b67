//! Concurrent doc-set cache with at-most-once computation.
//!
//! Entries are keyed on `(generation, key)`. The first requester of an entry
//! computes it outside the map lock; everyone else asking for the same entry
//! blocks on the entry's slot until the computation resolves. A failed
//! computation is not cached: the slot is removed before the waiters wake, so
//! the next request computes again.
//!
//! Entries of a generation are dropped when its [`CoreKey`] closes.

use crate::docset::{self, DocIdSet};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::{CacheKey, CoreId, CoreKey, IndexReader};
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

enum SlotState {
    Computing,
    Ready(Arc<dyn DocIdSet>),
    Failed(Arc<Error>),
}

/// One entry: the value or the promise of one
struct Slot {
    state: Mutex<SlotState>,
    resolved: Condvar,
}

impl Slot {
    fn computing() -> Self {
        Self {
            state: Mutex::new(SlotState::Computing),
            resolved: Condvar::new(),
        }
    }

    fn resolve(&self, state: SlotState) {
        *self.state.lock() = state;
        self.resolved.notify_all();
    }

    /// Block until the slot resolves
    fn wait(&self) -> Result<Arc<dyn DocIdSet>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                SlotState::Computing => self.resolved.wait(&mut state),
                SlotState::Ready(set) => return Ok(Arc::clone(set)),
                SlotState::Failed(err) => return Err(Error::Shared(Arc::clone(err))),
            }
        }
    }
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests answered from an existing or in-flight entry
    pub hits: u64,
    /// Requests that had to compute
    pub misses: u64,
    /// Computations that produced a cached value
    pub computations: u64,
    /// Entries dropped by generation close or [`DocSetCache::evict`]
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

type Entries<K> = AHashMap<CoreId, AHashMap<K, Arc<Slot>>>;

struct CacheInner<K> {
    entries: Mutex<Entries<K>>,
    counters: Counters,
}

impl<K: Hash + Eq> CacheInner<K> {
    /// Drop every entry of a generation. A closed generation loses its map
    /// too; an open one keeps it, so its close listener is not registered
    /// again.
    fn evict(&self, core: CoreId, closed: bool) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            if closed {
                entries.remove(&core).unwrap_or_default()
            } else {
                entries.get_mut(&core).map(std::mem::take).unwrap_or_default()
            }
        };
        let count = removed.len();
        if count > 0 {
            self.counters
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(core = %core, entries = count, closed, "evicted doc sets");
        }
        // Cached sets are dropped outside the lock: dropping one may close
        // another generation and re-enter this cache
        drop(removed);
        count
    }

    /// Forget a failed slot, unless something already replaced it
    fn forget(&self, core: CoreId, key: &K, slot: &Arc<Slot>) {
        let mut entries = self.entries.lock();
        if let Some(per_core) = entries.get_mut(&core) {
            if per_core.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
                per_core.remove(key);
            }
        }
    }
}

/// Resolves the leader's slot as failed if the computation unwinds
struct LeaderGuard<'a, K: Hash + Eq> {
    inner: &'a CacheInner<K>,
    core: CoreId,
    key: &'a K,
    slot: &'a Arc<Slot>,
    armed: bool,
}

impl<K: Hash + Eq> LeaderGuard<'_, K> {
    fn fail(&mut self, err: Arc<Error>) {
        self.armed = false;
        self.inner.forget(self.core, self.key, self.slot);
        self.slot.resolve(SlotState::Failed(err));
    }

    fn succeed(&mut self, set: Arc<dyn DocIdSet>) {
        self.armed = false;
        self.slot.resolve(SlotState::Ready(set));
    }
}

impl<K: Hash + Eq> Drop for LeaderGuard<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            self.fail(Arc::new(Error::ComputationPanicked));
        }
    }
}

/// Cache of doc sets per generation
pub struct DocSetCache<K = CacheKey> {
    inner: Arc<CacheInner<K>>,
}

impl<K> Clone for DocSetCache<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for DocSetCache<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(AHashMap::new()),
                counters: Counters::default(),
            }),
        }
    }
}

impl<K> fmt::Debug for DocSetCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.lock();
        f.debug_struct("DocSetCache")
            .field("generations", &entries.len())
            .field("entries", &entries.values().map(|m| m.len()).sum::<usize>())
            .finish()
    }
}

impl<K> DocSetCache<K>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached set for `(core, key)`, computing it if absent.
    ///
    /// Concurrent callers for the same entry run `compute` once between them.
    /// If it fails the caller that ran it gets the error; callers that waited
    /// get [`Error::Shared`] with the same failure.
    pub fn get_or_compute<F>(&self, core: &CoreKey, key: K, compute: F) -> Result<Arc<dyn DocIdSet>>
    where
        F: FnOnce() -> Result<Arc<dyn DocIdSet>>,
    {
        let core_id = core.id();
        let (slot, leader) = {
            let mut entries = self.inner.entries.lock();
            let per_core = entries.entry(core_id).or_insert_with(|| {
                let weak: Weak<CacheInner<K>> = Arc::downgrade(&self.inner);
                core.add_close_listener(move |closed| {
                    if let Some(inner) = weak.upgrade() {
                        inner.evict(closed, true);
                    }
                });
                AHashMap::new()
            });
            match per_core.get(&key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(Slot::computing());
                    per_core.insert(key.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !leader {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(core = %core_id, key = ?key, "doc set cache hit");
            return slot.wait();
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(core = %core_id, key = ?key, "doc set cache miss");
        let mut guard = LeaderGuard {
            inner: &self.inner,
            core: core_id,
            key: &key,
            slot: &slot,
            armed: true,
        };
        match compute() {
            Ok(set) => {
                self.inner
                    .counters
                    .computations
                    .fetch_add(1, Ordering::Relaxed);
                guard.succeed(Arc::clone(&set));
                Ok(set)
            }
            Err(err) => {
                debug!(core = %core_id, key = ?key, error = %err, "doc set computation failed");
                guard.fail(Arc::new(err.duplicate()));
                Err(err)
            }
        }
    }

    /// Drop every entry of a generation. Returns how many were dropped.
    pub fn evict(&self, core: CoreId) -> usize {
        self.inner.evict(core, false)
    }

    /// Entries across all generations, in-flight ones included
    pub fn len(&self) -> usize {
        self.inner.entries.lock().values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            computations: counters.computations.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }
}

/// A filter whose doc sets are cached per reader generation
pub struct CachingFilter {
    filter: Arc<dyn Filter>,
    cache: DocSetCache<CacheKey>,
}

impl CachingFilter {
    /// Cache into a cache of its own
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        Self::with_cache(filter, DocSetCache::new())
    }

    /// Cache into a shared cache
    pub fn with_cache(filter: Arc<dyn Filter>, cache: DocSetCache<CacheKey>) -> Self {
        Self { filter, cache }
    }

    pub fn cache(&self) -> &DocSetCache<CacheKey> {
        &self.cache
    }
}

impl fmt::Debug for CachingFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingFilter")
            .field("filter", &self.filter)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Filter for CachingFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        let set = self
            .cache
            .get_or_compute(&reader.core_key(), self.filter.cache_key(), || {
                let computed = self.filter.doc_id_set(reader)?;
                Ok(docset::cacheable(computed, reader.max_doc()))
            })?;
        Ok(Some(set))
    }

    fn cache_key(&self) -> CacheKey {
        self.filter.cache_key()
    }
}
