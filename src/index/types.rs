use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Segment-local or global document identifier
pub type DocId = u32;

/// Token position within a field (0-based)
pub type Position = u32;

/// Returned by iterators and postings once exhausted
pub const NO_MORE_DOCS: DocId = DocId::MAX;

/// A term: field name plus token text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// Key identifying a computation (a filter or predicate) for caching.
///
/// `Instance` keys are unique per value and never compare equal to anything
/// else. `Structural` keys are derived from a description, so two filters built
/// the same way share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Instance(u64),
    Structural(Arc<str>),
}

impl CacheKey {
    /// A fresh key equal to no other
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CacheKey::Instance(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn structural(description: impl Into<String>) -> Self {
        CacheKey::Structural(Arc::from(description.into()))
    }

    /// Structural key for a composite built from other keys
    pub fn compose<'a>(kind: &str, parts: impl IntoIterator<Item = &'a CacheKey>) -> Self {
        let parts: Vec<String> = parts.into_iter().map(|p| p.to_string()).collect();
        Self::structural(format!("{}({})", kind, parts.join(",")))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Instance(id) => write!(f, "#{}", id),
            CacheKey::Structural(desc) => f.write_str(desc),
        }
    }
}
