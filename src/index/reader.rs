//! The read contract every index (and every filtered view of one) implements.
//!
//! A reader is either a leaf segment with its own doc-id space or a composite
//! of ordered children. Composites expose their children through
//! [`IndexReader::sub_readers`]; [`gather_leaves`] flattens a reader into its
//! leaves together with the global doc id each leaf starts at.

use crate::error::Result;
use crate::index::core_key::CoreKey;
use crate::index::types::*;
use std::fmt::Debug;
use std::sync::Arc;

/// Enumerator over one term's postings, in increasing doc-id order.
///
/// Deleted documents are never returned.
pub trait Postings: Send {
    /// Current document, `None` before the first move
    fn doc(&self) -> Option<DocId>;

    /// Move to the next document. Returns [`NO_MORE_DOCS`] once exhausted.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Move to the first document `>= target`, never backward
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if let Some(doc) = self.doc() {
            if doc >= target {
                return Ok(doc);
            }
        }
        loop {
            let doc = self.next_doc()?;
            if doc >= target {
                return Ok(doc);
            }
        }
    }

    /// Occurrences of the term in the current document
    fn freq(&self) -> u32;

    /// Next position of the term in the current document.
    /// Must be called at most `freq()` times per document.
    fn next_position(&mut self) -> Result<Position>;
}

/// Postings of a term no document contains
#[derive(Debug, Default)]
pub struct EmptyPostings {
    exhausted: bool,
}

impl Postings for EmptyPostings {
    fn doc(&self) -> Option<DocId> {
        self.exhausted.then_some(NO_MORE_DOCS)
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.exhausted = true;
        Ok(NO_MORE_DOCS)
    }

    fn freq(&self) -> u32 {
        0
    }

    fn next_position(&mut self) -> Result<Position> {
        panic!("next_position called on empty postings");
    }
}

/// Read access to an index generation
pub trait IndexReader: Send + Sync + Debug {
    /// One past the largest doc id
    fn max_doc(&self) -> u32;

    /// Documents that are not deleted
    fn num_docs(&self) -> u32;

    /// Whether `doc` is deleted. Panics if `doc >= max_doc()`.
    fn is_deleted(&self, doc: DocId) -> bool;

    fn has_deletions(&self) -> bool;

    /// Documents containing `term`, deleted ones included
    fn doc_freq(&self, term: &Term) -> Result<u32>;

    fn postings(&self, term: &Term) -> Result<Box<dyn Postings + '_>>;

    /// Distinct terms of `field`, sorted
    fn terms(&self, field: &str) -> Result<Vec<Term>>;

    /// Children in doc-id order, or `None` for a leaf
    fn sub_readers(&self) -> Option<&[Arc<dyn IndexReader>]>;

    /// Identity of this generation for cache keying
    fn core_key(&self) -> CoreKey;

    /// Open the latest generation. `None` when nothing changed.
    fn reopen(&self) -> Result<Option<Arc<dyn IndexReader>>>;
}

/// A leaf of a reader tree and where its doc ids start globally
#[derive(Debug, Clone, Copy)]
pub struct LeafContext<'a> {
    pub reader: &'a Arc<dyn IndexReader>,
    /// Position among the leaves
    pub ord: usize,
    pub doc_base: DocId,
}

/// Flatten `reader` into its leaves, in ascending `doc_base` order
pub fn gather_leaves(reader: &Arc<dyn IndexReader>) -> Vec<LeafContext<'_>> {
    let mut leaves = Vec::new();
    let mut doc_base = 0;
    collect_leaves(reader, &mut leaves, &mut doc_base);
    leaves
}

fn collect_leaves<'a>(
    reader: &'a Arc<dyn IndexReader>,
    leaves: &mut Vec<LeafContext<'a>>,
    doc_base: &mut DocId,
) {
    match reader.sub_readers() {
        Some(children) => {
            for child in children {
                collect_leaves(child, leaves, doc_base);
            }
        }
        None => {
            leaves.push(LeafContext {
                reader,
                ord: leaves.len(),
                doc_base: *doc_base,
            });
            *doc_base += reader.max_doc();
        }
    }
}

/// Starting global doc id of each segment of a composite.
///
/// Built once from the children's `max_doc`; a reopened composite builds a new
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOffsets {
    /// `starts[i]` is segment i's first global id; the final entry is max_doc
    starts: Vec<DocId>,
}

impl SegmentOffsets {
    pub fn from_max_docs(max_docs: impl IntoIterator<Item = u32>) -> Self {
        let mut starts = vec![0];
        let mut total: DocId = 0;
        for max_doc in max_docs {
            total = total
                .checked_add(max_doc)
                .filter(|&t| t < NO_MORE_DOCS)
                .expect("composite max_doc overflows the doc-id space");
            starts.push(total);
        }
        Self { starts }
    }

    pub fn from_readers(readers: &[Arc<dyn IndexReader>]) -> Self {
        Self::from_max_docs(readers.iter().map(|r| r.max_doc()))
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_doc(&self) -> u32 {
        self.starts[self.starts.len() - 1]
    }

    pub fn start(&self, segment: usize) -> DocId {
        self.starts[segment]
    }

    /// Segment holding global `doc`. Panics if `doc >= max_doc()`.
    pub fn segment_of(&self, doc: DocId) -> usize {
        assert!(
            doc < self.max_doc(),
            "doc id {} out of range [0, {})",
            doc,
            self.max_doc()
        );
        // Last segment starting at or before doc; skips empty segments
        self.starts.partition_point(|&start| start <= doc) - 1
    }

    /// Split a global id into (segment, local id)
    pub fn locate(&self, doc: DocId) -> (usize, DocId) {
        let segment = self.segment_of(doc);
        (segment, doc - self.starts[segment])
    }
}

/// A global doc id resolved to its leaf
#[derive(Debug, Clone, Copy)]
pub struct ReaderAndOffset<'a> {
    pub reader: &'a Arc<dyn IndexReader>,
    /// Leaf ordinal
    pub reader_ord: usize,
    /// Doc id inside the leaf
    pub offset: DocId,
}

/// Find the leaf containing global `doc`, `None` if out of range
pub fn reader_and_offset(reader: &Arc<dyn IndexReader>, doc: DocId) -> Option<ReaderAndOffset<'_>> {
    gather_leaves(reader)
        .into_iter()
        .find(|leaf| doc >= leaf.doc_base && doc - leaf.doc_base < leaf.reader.max_doc())
        .map(|leaf| ReaderAndOffset {
            reader: leaf.reader,
            reader_ord: leaf.ord,
            offset: doc - leaf.doc_base,
        })
}

/// Collect every doc id a postings enumerator yields
pub fn collect_docs(postings: &mut dyn Postings) -> Result<Vec<DocId>> {
    let mut docs = Vec::new();
    loop {
        let doc = postings.next_doc()?;
        if doc == NO_MORE_DOCS {
            return Ok(docs);
        }
        docs.push(doc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_offsets_locate() {
        let offsets = SegmentOffsets::from_max_docs([3, 0, 4]);
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets.max_doc(), 7);
        assert_eq!(offsets.locate(0), (0, 0));
        assert_eq!(offsets.locate(2), (0, 2));
        // Empty segment 1 is skipped
        assert_eq!(offsets.locate(3), (2, 0));
        assert_eq!(offsets.locate(6), (2, 3));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_segment_offsets_out_of_range() {
        SegmentOffsets::from_max_docs([2]).segment_of(2);
    }

    #[test]
    fn test_empty_postings() {
        let mut postings = EmptyPostings::default();
        assert_eq!(postings.doc(), None);
        assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(postings.advance(5).unwrap(), NO_MORE_DOCS);
    }
}
