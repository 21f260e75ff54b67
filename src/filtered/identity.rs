//! Stable identities for filtered views.
//!
//! Two views over the same generation with equal predicate keys must report
//! the same [`CoreKey`], or caches keyed on the view would miss every time a
//! view is rebuilt. The table interns `(underlying core, predicate key)` to a
//! key. It holds interned keys weakly: an entry goes away when the last view
//! using it is dropped, and all entries of a core go away when the core
//! closes.

use crate::index::{CacheKey, CoreId, CoreKey, WeakCoreKey};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

type Entries = AHashMap<CoreId, AHashMap<CacheKey, WeakCoreKey>>;

/// How a filtered view derives its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKeyPolicy {
    /// Interned per underlying core and predicate key
    #[default]
    Filtered,
    /// The underlying reader's key, as if the view were not there
    Passthrough,
}

/// Interning table from `(underlying core, predicate key)` to view identity
#[derive(Clone, Default)]
pub struct IdentityTable {
    entries: Arc<Mutex<Entries>>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table used by default
    pub fn global() -> &'static IdentityTable {
        static GLOBAL: OnceLock<IdentityTable> = OnceLock::new();
        GLOBAL.get_or_init(IdentityTable::new)
    }

    /// The view key for `predicate` over `underlying`. Repeated calls with
    /// the same pair return the same key while some handle to it is alive.
    pub fn intern(&self, underlying: &CoreKey, predicate: &CacheKey) -> CoreKey {
        let mut entries = self.entries.lock();
        let per_core = entries.entry(underlying.id()).or_insert_with(|| {
            let weak: Weak<Mutex<Entries>> = Arc::downgrade(&self.entries);
            underlying.add_close_listener(move |closed| evict(&weak, closed));
            AHashMap::new()
        });
        if let Some(key) = per_core.get(predicate).and_then(WeakCoreKey::upgrade) {
            return key;
        }

        let key = CoreKey::new();
        let weak: Weak<Mutex<Entries>> = Arc::downgrade(&self.entries);
        let underlying_id = underlying.id();
        let interned = predicate.clone();
        key.add_close_listener(move |view| forget(&weak, underlying_id, &interned, view));
        tracing::trace!(
            underlying = %underlying_id,
            predicate = %predicate,
            view = %key.id(),
            "interned filtered view identity"
        );
        per_core.insert(predicate.clone(), key.downgrade());
        key
    }

    /// Interned keys that still have a live view
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .flat_map(|m| m.values())
            .filter(|key| !key.is_closed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict(entries: &Weak<Mutex<Entries>>, closed: CoreId) {
    let Some(entries) = entries.upgrade() else {
        return;
    };
    if let Some(removed) = entries.lock().remove(&closed) {
        tracing::trace!(underlying = %closed, keys = removed.len(), "evicted filtered view identities");
    }
}

/// Drop the entry of a closed view key, unless it was already replaced
fn forget(entries: &Weak<Mutex<Entries>>, underlying: CoreId, predicate: &CacheKey, view: CoreId) {
    let Some(entries) = entries.upgrade() else {
        return;
    };
    let mut entries = entries.lock();
    if let Some(per_core) = entries.get_mut(&underlying) {
        if per_core.get(predicate).is_some_and(|key| key.id() == view) {
            per_core.remove(predicate);
            tracing::trace!(underlying = %underlying, view = %view, "forgot filtered view identity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_intern_is_stable() {
        let table = IdentityTable::new();
        let core = CoreKey::new();
        let predicate = CacheKey::structural("p");

        let a = table.intern(&core, &predicate);
        let b = table.intern(&core, &predicate);
        assert_eq!(a, b);
        assert_ne!(a, core);

        let other = table.intern(&core, &CacheKey::structural("q"));
        assert_ne!(a, other);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_entries_evicted_when_core_closes() {
        let table = IdentityTable::new();
        let core = CoreKey::new();
        let view = table.intern(&core, &CacheKey::structural("p"));
        assert_eq!(table.len(), 1);

        drop(core);
        assert!(table.is_empty());
        // The view key stays usable for whoever holds it
        assert_eq!(view.handle_count(), 1);
    }

    #[test]
    fn test_entry_dropped_with_its_last_view() {
        let table = IdentityTable::new();
        let core = CoreKey::new();
        let closed = Arc::new(AtomicUsize::new(0));

        for _ in 0..1000 {
            let view = table.intern(&core, &CacheKey::unique());
            let counter = Arc::clone(&closed);
            view.add_close_listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1000);
        assert_eq!(table.len(), 0);
        assert!(table.entries.lock()[&core.id()].is_empty());
    }

    #[test]
    fn test_reintern_after_views_dropped() {
        let table = IdentityTable::new();
        let core = CoreKey::new();
        let predicate = CacheKey::structural("p");

        let first = table.intern(&core, &predicate);
        let first_id = first.id();
        let again = table.intern(&core, &predicate);
        assert_eq!(again.id(), first_id);
        drop(first);
        drop(again);
        assert!(table.is_empty());

        let fresh = table.intern(&core, &predicate);
        assert_ne!(fresh.id(), first_id);
        assert_eq!(table.len(), 1);
        // One listener on the core, however many views came and went
        assert_eq!(core.listener_count(), 1);
    }

    #[test]
    fn test_table_dropped_before_core() {
        let core = CoreKey::new();
        {
            let table = IdentityTable::new();
            table.intern(&core, &CacheKey::structural("p"));
        }
        // Listener finds the table gone and does nothing
        drop(core);
    }
}
