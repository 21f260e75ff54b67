//! Projections of a global doc set onto one leaf's id range.
//!
//! A slice over `[start, end)` yields the ids of the underlying set that fall
//! in the range, rebased by `-start`.

use super::{DocIdSet, DocIterator, FixedBitSet};
use crate::index::{DocId, NO_MORE_DOCS};
use crate::predicate::Bits;
use std::sync::Arc;

fn check_range(start: u32, end: u32, len: Option<u32>) {
    assert!(start <= end, "slice end {} before start {}", end, start);
    if let Some(len) = len {
        assert!(
            end <= len,
            "slice end {} beyond underlying length {}",
            end,
            len
        );
    }
}

/// Any doc set restricted to `[start, end)` and rebased
#[derive(Debug)]
pub struct DocIdSetSlice {
    set: Arc<dyn DocIdSet>,
    start: DocId,
    end: DocId,
}

impl DocIdSetSlice {
    pub fn new(set: Arc<dyn DocIdSet>, start: DocId, end: DocId) -> Self {
        check_range(start, end, set.bits().and_then(|b| b.len()));
        Self { set, start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl DocIdSet for DocIdSetSlice {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(SliceIterator {
            inner: self.set.iterator(),
            start: self.start,
            end: self.end,
            doc: None,
        })
    }

    fn is_cacheable(&self) -> bool {
        self.set.is_cacheable()
    }

    fn bits(&self) -> Option<&dyn Bits> {
        self.set.bits().map(|_| self as &dyn Bits)
    }
}

impl Bits for DocIdSetSlice {
    fn get(&self, index: u32) -> bool {
        assert!(index < self.len(), "bit {} out of slice range", index);
        self.set
            .bits()
            .is_some_and(|bits| bits.get(self.start + index))
    }

    fn len(&self) -> Option<u32> {
        Some(self.end - self.start)
    }
}

struct SliceIterator {
    inner: Box<dyn DocIterator>,
    start: DocId,
    end: DocId,
    doc: Option<DocId>,
}

impl SliceIterator {
    fn rebase(&mut self, global: DocId) -> DocId {
        let doc = if global < self.end {
            global - self.start
        } else {
            NO_MORE_DOCS
        };
        self.doc = Some(doc);
        doc
    }
}

impl DocIterator for SliceIterator {
    fn doc(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> DocId {
        let global = match self.doc {
            None => self.inner.advance(self.start),
            Some(NO_MORE_DOCS) => return NO_MORE_DOCS,
            Some(_) => self.inner.next_doc(),
        };
        self.rebase(global)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        match self.doc {
            Some(doc) if doc >= target => doc,
            _ => {
                let global = self.inner.advance(self.start.saturating_add(target));
                self.rebase(global)
            }
        }
    }

    fn cost(&self) -> u64 {
        self.inner.cost().min((self.end - self.start) as u64)
    }
}

/// Random-access slice of a [`FixedBitSet`]
#[derive(Debug, Clone)]
pub struct BitSetSlice {
    set: FixedBitSet,
    start: DocId,
    end: DocId,
}

impl BitSetSlice {
    pub fn new(set: FixedBitSet, start: DocId, end: DocId) -> Self {
        check_range(start, end, Some(set.len()));
        Self { set, start, end }
    }

    /// Set bits inside the slice
    pub fn cardinality(&self) -> u32 {
        self.set
            .iter()
            .skip_while(|&d| d < self.start)
            .take_while(|&d| d < self.end)
            .count() as u32
    }
}

impl Bits for BitSetSlice {
    fn get(&self, index: u32) -> bool {
        assert!(
            index < self.end - self.start,
            "bit {} out of slice range",
            index
        );
        self.set.get(self.start + index)
    }

    fn len(&self) -> Option<u32> {
        Some(self.end - self.start)
    }
}

impl DocIdSet for BitSetSlice {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(SliceIterator {
            inner: self.set.iterator(),
            start: self.start,
            end: self.end,
            doc: None,
        })
    }

    fn is_cacheable(&self) -> bool {
        true
    }

    fn bits(&self) -> Option<&dyn Bits> {
        Some(self)
    }
}
