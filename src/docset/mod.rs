//! Doc sets: ordered, duplicate-free sets of doc ids and forward-only
//! iterators over them.
//!
//! Concrete encodings:
//!
//! - [`FixedBitSet`] - dense, one bit per doc, O(1) membership
//! - [`SortedDocSet`] - sparse, sorted ids
//! - [`AllDocSet`] and the canonical [`empty`] set
//! - [`BooleanDocSet`] - lazy combination of other sets
//!
//! Iterators are `'static`: they hold `Arc` handles to the set's storage, so a
//! set can be iterated from any thread while it sits in a cache.

pub mod bitset;
pub mod boolean;
pub mod slice;
pub mod sorted;

pub use bitset::{FixedBitSet, FixedBitSetBuilder};
pub use boolean::{BooleanDocSet, and, not, or};
pub use slice::{BitSetSlice, DocIdSetSlice};
pub use sorted::SortedDocSet;

use crate::index::{DocId, IndexReader, NO_MORE_DOCS};
use crate::predicate::Bits;
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

/// Forward-only cursor over increasing doc ids
pub trait DocIterator: Send {
    /// Current doc, `None` before the first move
    fn doc(&self) -> Option<DocId>;

    /// Move to the next doc. Returns [`NO_MORE_DOCS`] once exhausted, and keeps
    /// returning it.
    fn next_doc(&mut self) -> DocId;

    /// Move to the first doc `>= target`. Never moves backward: if the current
    /// doc is already `>= target` it is returned unchanged.
    fn advance(&mut self, target: DocId) -> DocId {
        if let Some(doc) = self.doc() {
            if doc >= target {
                return doc;
            }
        }
        loop {
            let doc = self.next_doc();
            if doc >= target {
                return doc;
            }
        }
    }

    /// Upper bound on the docs left to visit
    fn cost(&self) -> u64;
}

/// An immutable set of doc ids
pub trait DocIdSet: Send + Sync + Debug {
    fn iterator(&self) -> Box<dyn DocIterator>;

    /// True when iterating twice yields the same ids without side effects
    fn is_cacheable(&self) -> bool;

    /// Random-access view, when the encoding has one
    fn bits(&self) -> Option<&dyn Bits> {
        None
    }
}

/// The set with no docs
#[derive(Debug)]
pub struct EmptyDocSet;

impl DocIdSet for EmptyDocSet {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(EmptyIterator { started: false })
    }

    fn is_cacheable(&self) -> bool {
        true
    }
}

struct EmptyIterator {
    started: bool,
}

impl DocIterator for EmptyIterator {
    fn doc(&self) -> Option<DocId> {
        self.started.then_some(NO_MORE_DOCS)
    }

    fn next_doc(&mut self) -> DocId {
        self.started = true;
        NO_MORE_DOCS
    }

    fn advance(&mut self, _target: DocId) -> DocId {
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        0
    }
}

/// The canonical empty set. Every call returns the same `Arc`.
pub fn empty() -> Arc<dyn DocIdSet> {
    static EMPTY: OnceLock<Arc<dyn DocIdSet>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(EmptyDocSet)))
}

/// Whether `set` is the canonical empty set (identity, not content)
pub fn is_canonical_empty(set: &Arc<dyn DocIdSet>) -> bool {
    Arc::ptr_eq(set, &empty())
}

/// Every doc in `0..max_doc`
#[derive(Debug, Clone, Copy)]
pub struct AllDocSet {
    max_doc: u32,
}

impl AllDocSet {
    pub fn new(max_doc: u32) -> Self {
        Self { max_doc }
    }
}

impl DocIdSet for AllDocSet {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(AllDocsIterator::new(self.max_doc))
    }

    fn is_cacheable(&self) -> bool {
        true
    }

    fn bits(&self) -> Option<&dyn Bits> {
        Some(self)
    }
}

impl Bits for AllDocSet {
    fn get(&self, index: u32) -> bool {
        index < self.max_doc
    }

    fn len(&self) -> Option<u32> {
        Some(self.max_doc)
    }
}

/// Iterates `0..max_doc`
pub struct AllDocsIterator {
    max_doc: u32,
    doc: Option<DocId>,
}

impl AllDocsIterator {
    pub fn new(max_doc: u32) -> Self {
        Self { max_doc, doc: None }
    }
}

impl DocIterator for AllDocsIterator {
    fn doc(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> DocId {
        let next = match self.doc {
            None => 0,
            Some(NO_MORE_DOCS) => NO_MORE_DOCS,
            Some(doc) => doc + 1,
        };
        self.advance_to(next)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        match self.doc {
            Some(doc) if doc >= target => doc,
            _ => self.advance_to(target),
        }
    }

    fn cost(&self) -> u64 {
        self.max_doc as u64
    }
}

impl AllDocsIterator {
    fn advance_to(&mut self, target: DocId) -> DocId {
        let doc = if target < self.max_doc {
            target
        } else {
            NO_MORE_DOCS
        };
        self.doc = Some(doc);
        doc
    }
}

/// A set safe to cache: `None` becomes the canonical empty set, cacheable sets
/// pass through, anything else is materialized into a [`FixedBitSet`].
pub fn cacheable(set: Option<Arc<dyn DocIdSet>>, max_doc: u32) -> Arc<dyn DocIdSet> {
    match set {
        None => empty(),
        Some(set) if set.is_cacheable() => set,
        Some(set) => {
            let mut builder = FixedBitSetBuilder::new(max_doc);
            builder.or_iter(set.iterator().as_mut());
            Arc::new(builder.freeze())
        }
    }
}

/// Like [`cacheable`], but materializes into a [`SortedDocSet`]
pub fn cacheable_sparse(set: Option<Arc<dyn DocIdSet>>) -> Arc<dyn DocIdSet> {
    match set {
        None => empty(),
        Some(set) if set.is_cacheable() => set,
        Some(set) => Arc::new(SortedDocSet::new(collect(set.as_ref()))),
    }
}

/// Whether `set` contains `doc`. A missing set contains nothing.
pub fn contains(set: Option<&dyn DocIdSet>, doc: DocId) -> bool {
    let Some(set) = set else {
        return false;
    };
    if let Some(bits) = set.bits() {
        return bits.len().is_none_or(|len| doc < len) && bits.get(doc);
    }
    set.iterator().advance(doc) == doc
}

/// All ids of `set`, in order
pub fn collect(set: &dyn DocIdSet) -> Vec<DocId> {
    collect_iter(set.iterator().as_mut())
}

/// Drain an iterator into a vector
pub fn collect_iter(iter: &mut dyn DocIterator) -> Vec<DocId> {
    let mut docs = Vec::new();
    loop {
        let doc = iter.next_doc();
        if doc == NO_MORE_DOCS {
            return docs;
        }
        docs.push(doc);
    }
}

/// `set` without the docs `reader` reports as deleted, evaluated lazily
#[derive(Debug)]
pub struct RemoveDeleted {
    set: Arc<dyn DocIdSet>,
    reader: Arc<dyn IndexReader>,
}

impl RemoveDeleted {
    pub fn new(set: Arc<dyn DocIdSet>, reader: Arc<dyn IndexReader>) -> Self {
        Self { set, reader }
    }

    /// Skip the wrapper when the reader has nothing deleted
    pub fn wrap(set: Arc<dyn DocIdSet>, reader: Arc<dyn IndexReader>) -> Arc<dyn DocIdSet> {
        if reader.has_deletions() {
            Arc::new(Self::new(set, reader))
        } else {
            set
        }
    }
}

impl DocIdSet for RemoveDeleted {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(RemoveDeletedIterator {
            inner: self.set.iterator(),
            reader: Arc::clone(&self.reader),
        })
    }

    fn is_cacheable(&self) -> bool {
        false
    }
}

struct RemoveDeletedIterator {
    inner: Box<dyn DocIterator>,
    reader: Arc<dyn IndexReader>,
}

impl RemoveDeletedIterator {
    fn skip_deleted(&mut self, mut doc: DocId) -> DocId {
        while doc != NO_MORE_DOCS && self.reader.is_deleted(doc) {
            doc = self.inner.next_doc();
        }
        doc
    }
}

impl DocIterator for RemoveDeletedIterator {
    fn doc(&self) -> Option<DocId> {
        self.inner.doc()
    }

    fn next_doc(&mut self) -> DocId {
        let doc = self.inner.next_doc();
        self.skip_deleted(doc)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        let doc = self.inner.advance(target);
        self.skip_deleted(doc)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}
