//! Generation identity tokens.
//!
//! Every segment core and every composite generation owns a [`CoreKey`].
//! Caches key their entries on the [`CoreId`] and register a close listener so
//! the entries go away when the last handle to the generation is dropped.
//! Eviction is therefore deterministic: it happens on the drop, not whenever a
//! collector gets around to it.

use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Plain identifier of a generation. Holding one does not keep it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(pub u64);

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core-{}", self.0)
    }
}

type CloseListener = Box<dyn FnOnce(CoreId) + Send>;

struct CoreInner {
    id: CoreId,
    listeners: Mutex<Vec<CloseListener>>,
}

impl Drop for CoreInner {
    fn drop(&mut self) {
        let listeners = std::mem::take(self.listeners.get_mut());
        for listener in listeners {
            listener(self.id);
        }
    }
}

/// Shared handle to a generation's identity
#[derive(Clone)]
pub struct CoreKey(Arc<CoreInner>);

impl CoreKey {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(Arc::new(CoreInner {
            id: CoreId(NEXT.fetch_add(1, Ordering::Relaxed)),
            listeners: Mutex::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> CoreId {
        self.0.id
    }

    /// Run `listener` once, when the last handle to this key is dropped
    pub fn add_close_listener(&self, listener: impl FnOnce(CoreId) + Send + 'static) {
        self.0.listeners.lock().push(Box::new(listener));
    }

    /// Number of live handles, including this one
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// A reference that does not keep the generation open
    pub fn downgrade(&self) -> WeakCoreKey {
        WeakCoreKey {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.0.listeners.lock().len()
    }
}

/// Non-owning [`CoreKey`] reference
#[derive(Clone)]
pub struct WeakCoreKey {
    id: CoreId,
    inner: Weak<CoreInner>,
}

impl WeakCoreKey {
    pub fn id(&self) -> CoreId {
        self.id
    }

    /// The key, unless its last handle is gone
    pub fn upgrade(&self) -> Option<CoreKey> {
        self.inner.upgrade().map(CoreKey)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl fmt::Debug for WeakCoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakCoreKey({})", self.id)
    }
}

impl Default for CoreKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for CoreKey {}

impl Hash for CoreKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for CoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreKey({})", self.0.id)
    }
}
