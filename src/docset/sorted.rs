//! Sparse doc sets backed by a sorted id slice.

use super::{DocIdSet, DocIterator};
use crate::index::{DocId, NO_MORE_DOCS};
use std::fmt;
use std::sync::Arc;

/// Immutable sorted list of doc ids
#[derive(Clone)]
pub struct SortedDocSet {
    docs: Arc<[DocId]>,
}

impl SortedDocSet {
    /// Ids must be strictly increasing
    pub fn new(docs: Vec<DocId>) -> Self {
        debug_assert!(
            docs.windows(2).all(|w| w[0] < w[1]),
            "sorted doc set input is not strictly increasing"
        );
        Self {
            docs: Arc::from(docs),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn as_slice(&self) -> &[DocId] {
        &self.docs
    }
}

impl fmt::Debug for SortedDocSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedDocSet")
            .field("len", &self.docs.len())
            .finish()
    }
}

impl DocIdSet for SortedDocSet {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(SortedIterator {
            docs: Arc::clone(&self.docs),
            index: None,
        })
    }

    fn is_cacheable(&self) -> bool {
        true
    }
}

struct SortedIterator {
    docs: Arc<[DocId]>,
    /// `Some(len)` once exhausted
    index: Option<usize>,
}

impl SortedIterator {
    fn current(&self, index: usize) -> DocId {
        self.docs.get(index).copied().unwrap_or(NO_MORE_DOCS)
    }
}

impl DocIterator for SortedIterator {
    fn doc(&self) -> Option<DocId> {
        self.index.map(|i| self.current(i))
    }

    fn next_doc(&mut self) -> DocId {
        let next = match self.index {
            None => 0,
            Some(i) => (i + 1).min(self.docs.len()),
        };
        self.index = Some(next);
        self.current(next)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        let from = match self.index {
            Some(i) if self.current(i) >= target => return self.current(i),
            Some(i) => i,
            None => 0,
        };
        let remaining = &self.docs[from..];

        // Gallop to bracket the target, then binary search inside the bracket
        let mut bound = 1;
        while bound < remaining.len() && remaining[bound] < target {
            bound *= 2;
        }
        let low = bound / 2;
        let high = (bound + 1).min(remaining.len());
        let offset = low + remaining[low..high].partition_point(|&d| d < target);

        let index = from + offset;
        self.index = Some(index);
        self.current(index)
    }

    fn cost(&self) -> u64 {
        let consumed = self.index.map_or(0, |i| i);
        self.docs.len().saturating_sub(consumed) as u64
    }
}
