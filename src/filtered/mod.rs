//! Reader views narrowed by a predicate.
//!
//! A [`FilteredReader`] reports every doc the predicate rejects as deleted and
//! hides it from postings, so anything built on the read contract (filters,
//! the phrase matcher, further views) sees the narrowed index. Leaf and
//! composite readers are wrapped by the same type; the variant follows
//! [`IndexReader::sub_readers`] of the wrapped reader.

pub mod identity;

pub use identity::{CacheKeyPolicy, IdentityTable};

use crate::docset::{FixedBitSet, FixedBitSetBuilder};
use crate::error::{Error, Result};
use crate::index::{
    CoreKey, DocId, IndexReader, MultiPostings, NO_MORE_DOCS, Position, Postings,
    SegmentOffsets, Term,
};
use crate::predicate::BitsProvider;
use std::fmt;
use std::sync::Arc;

enum View {
    Leaf {
        /// Docs the predicate accepts
        accepted: FixedBitSet,
        num_docs: u32,
    },
    Composite {
        children: Vec<Arc<dyn IndexReader>>,
        offsets: SegmentOffsets,
        num_docs: u32,
    },
}

/// An index reader with the docs a predicate rejects removed
pub struct FilteredReader {
    inner: Arc<dyn IndexReader>,
    provider: Arc<dyn BitsProvider>,
    policy: CacheKeyPolicy,
    table: IdentityTable,
    core_key: CoreKey,
    view: View,
}

impl FilteredReader {
    /// Wrap `reader` with the default identity policy and the global table
    pub fn wrap(reader: Arc<dyn IndexReader>, provider: Arc<dyn BitsProvider>) -> Result<Arc<Self>> {
        Self::wrap_with_policy(reader, provider, CacheKeyPolicy::default())
    }

    pub fn wrap_with_policy(
        reader: Arc<dyn IndexReader>,
        provider: Arc<dyn BitsProvider>,
        policy: CacheKeyPolicy,
    ) -> Result<Arc<Self>> {
        Self::wrap_in(reader, provider, policy, IdentityTable::global())
    }

    /// Wrap, interning identities in `table`
    pub fn wrap_in(
        reader: Arc<dyn IndexReader>,
        provider: Arc<dyn BitsProvider>,
        policy: CacheKeyPolicy,
        table: &IdentityTable,
    ) -> Result<Arc<Self>> {
        let view = match reader.sub_readers() {
            Some(children) => {
                let mut wrapped: Vec<Arc<dyn IndexReader>> = Vec::with_capacity(children.len());
                for child in children {
                    wrapped.push(Self::wrap_in(
                        Arc::clone(child),
                        Arc::clone(&provider),
                        policy,
                        table,
                    )?);
                }
                let offsets = SegmentOffsets::from_readers(&wrapped);
                let num_docs = wrapped.iter().map(|c| c.num_docs()).sum();
                View::Composite {
                    children: wrapped,
                    offsets,
                    num_docs,
                }
            }
            None => Self::leaf_view(reader.as_ref(), &reader, provider.as_ref())?,
        };

        let core_key = match policy {
            CacheKeyPolicy::Filtered => table.intern(&reader.core_key(), &provider.cache_key()),
            CacheKeyPolicy::Passthrough => reader.core_key(),
        };

        Ok(Arc::new(Self {
            inner: reader,
            provider,
            policy,
            table: table.clone(),
            core_key,
            view,
        }))
    }

    fn leaf_view(
        leaf: &dyn IndexReader,
        handle: &Arc<dyn IndexReader>,
        provider: &dyn BitsProvider,
    ) -> Result<View> {
        let max_doc = leaf.max_doc();
        let bits = provider.get(handle).map_err(|e| {
            Error::predicate(
                format!(
                    "evaluating predicate {} on {}",
                    provider.cache_key(),
                    leaf.core_key().id()
                ),
                e,
            )
        })?;
        if let Some(len) = bits.len() {
            if len < max_doc {
                return Err(Error::PredicateLength {
                    expected: max_doc,
                    actual: len,
                });
            }
        }

        let mut accepted = FixedBitSetBuilder::new(max_doc);
        let mut num_docs = 0;
        for doc in 0..max_doc {
            if bits.get(doc) {
                accepted.set(doc);
                if !leaf.is_deleted(doc) {
                    num_docs += 1;
                }
            }
        }
        Ok(View::Leaf {
            accepted: accepted.freeze(),
            num_docs,
        })
    }

    /// The wrapped reader
    pub fn inner(&self) -> &Arc<dyn IndexReader> {
        &self.inner
    }

    pub fn provider(&self) -> &Arc<dyn BitsProvider> {
        &self.provider
    }

    pub fn policy(&self) -> CacheKeyPolicy {
        self.policy
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.view, View::Leaf { .. })
    }
}

impl fmt::Debug for FilteredReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredReader")
            .field("core", &self.core_key)
            .field("inner", &self.inner)
            .field("predicate", &self.provider.cache_key())
            .field("policy", &self.policy)
            .field("leaf", &self.is_leaf())
            .finish()
    }
}

impl IndexReader for FilteredReader {
    fn max_doc(&self) -> u32 {
        self.inner.max_doc()
    }

    fn num_docs(&self) -> u32 {
        match &self.view {
            View::Leaf { num_docs, .. } | View::Composite { num_docs, .. } => *num_docs,
        }
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        match &self.view {
            View::Leaf { accepted, .. } => {
                assert!(
                    doc < accepted.len(),
                    "doc id {} out of range [0, {})",
                    doc,
                    accepted.len()
                );
                self.inner.is_deleted(doc) || !accepted.get(doc)
            }
            View::Composite {
                children, offsets, ..
            } => {
                let (segment, local) = offsets.locate(doc);
                children[segment].is_deleted(local)
            }
        }
    }

    fn has_deletions(&self) -> bool {
        self.num_docs() < self.max_doc()
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        self.inner.doc_freq(term)
    }

    fn postings(&self, term: &Term) -> Result<Box<dyn Postings + '_>> {
        match &self.view {
            View::Leaf { accepted, .. } => Ok(Box::new(FilteredPostings {
                inner: self.inner.postings(term)?,
                accepted,
            })),
            View::Composite {
                children, offsets, ..
            } => Ok(Box::new(MultiPostings::new(children, offsets, term.clone()))),
        }
    }

    fn terms(&self, field: &str) -> Result<Vec<Term>> {
        self.inner.terms(field)
    }

    fn sub_readers(&self) -> Option<&[Arc<dyn IndexReader>]> {
        match &self.view {
            View::Leaf { .. } => None,
            View::Composite { children, .. } => Some(children),
        }
    }

    fn core_key(&self) -> CoreKey {
        self.core_key.clone()
    }

    fn reopen(&self) -> Result<Option<Arc<dyn IndexReader>>> {
        let Some(reopened) = self.inner.reopen()? else {
            return Ok(None);
        };
        let wrapped: Arc<dyn IndexReader> = Self::wrap_in(
            reopened,
            Arc::clone(&self.provider),
            self.policy,
            &self.table,
        )?;
        Ok(Some(wrapped))
    }
}

/// Underlying postings minus the docs the predicate rejects
struct FilteredPostings<'a> {
    inner: Box<dyn Postings + 'a>,
    accepted: &'a FixedBitSet,
}

impl FilteredPostings<'_> {
    fn skip_rejected(&mut self, mut doc: DocId) -> Result<DocId> {
        while doc != NO_MORE_DOCS && !self.accepted.get(doc) {
            doc = self.inner.next_doc()?;
        }
        Ok(doc)
    }
}

impl Postings for FilteredPostings<'_> {
    fn doc(&self) -> Option<DocId> {
        self.inner.doc()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.inner.next_doc()?;
        self.skip_rejected(doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.inner.advance(target)?;
        self.skip_rejected(doc)
    }

    fn freq(&self) -> u32 {
        self.inner.freq()
    }

    fn next_position(&mut self) -> Result<Position> {
        self.inner.next_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::reader::collect_docs;
    use crate::index::{CacheKey, Document, MemoryIndex};
    use crate::predicate::{Bits, ConstantBits, Predicates};

    fn index() -> MemoryIndex {
        let index = MemoryIndex::new();
        for i in 0..4 {
            index.add_document(Document::new().text("f", &format!("x doc{}", i)));
        }
        index.commit();
        for i in 4..6 {
            index.add_document(Document::new().text("f", &format!("x doc{}", i)));
        }
        index.commit();
        index
    }

    fn not_first() -> Arc<dyn BitsProvider> {
        Predicates::from_fn(CacheKey::structural("not_first"), |d| d != 0)
    }

    #[test]
    fn test_liveness_combines_deletions_and_predicate() {
        let index = index();
        index.delete_document(2);
        let table = IdentityTable::new();
        let view = FilteredReader::wrap_in(
            index.reader(),
            not_first(),
            CacheKeyPolicy::Filtered,
            &table,
        )
        .unwrap();

        assert!(!view.is_leaf());
        assert_eq!(view.max_doc(), 6);
        // Local doc 0 of each segment is rejected, global 2 is deleted
        assert!(view.is_deleted(0));
        assert!(!view.is_deleted(1));
        assert!(view.is_deleted(2));
        assert!(view.is_deleted(4));
        assert_eq!(view.num_docs(), 3);
        assert!(view.has_deletions());

        let docs = collect_docs(view.postings(&Term::new("f", "x")).unwrap().as_mut()).unwrap();
        assert_eq!(docs, vec![1, 3, 5]);
        // Statistics are not corrected
        assert_eq!(view.doc_freq(&Term::new("f", "x")).unwrap(), 6);
    }

    #[test]
    fn test_has_deletions_only_when_docs_are_hidden() {
        let index = index();
        let table = IdentityTable::new();
        let all = Predicates::from_fn(CacheKey::structural("all"), |_| true);
        let view = FilteredReader::wrap_in(index.reader(), Arc::clone(&all), CacheKeyPolicy::Filtered, &table)
            .unwrap();
        assert!(!view.has_deletions());
        assert!(view.sub_readers().unwrap().iter().all(|leaf| !leaf.has_deletions()));

        index.delete_document(1);
        let view = FilteredReader::wrap_in(index.reader(), all, CacheKeyPolicy::Filtered, &table).unwrap();
        assert!(view.has_deletions());
        let leaves = view.sub_readers().unwrap();
        assert!(leaves[0].has_deletions());
        assert!(!leaves[1].has_deletions());
    }

    #[test]
    fn test_postings_advance_skips_rejected() {
        let index = index();
        let table = IdentityTable::new();
        let provider = Predicates::from_fn(CacheKey::structural("odd"), |d| d % 2 == 1);
        let view =
            FilteredReader::wrap_in(index.reader(), provider, CacheKeyPolicy::Filtered, &table)
                .unwrap();
        let mut postings = view.postings(&Term::new("f", "x")).unwrap();
        assert_eq!(postings.advance(2).unwrap(), 3);
        assert_eq!(postings.advance(4).unwrap(), 5);
        assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_identity_stable_across_rewraps() {
        let index = index();
        let table = IdentityTable::new();
        let reader: Arc<dyn IndexReader> = index.reader();
        let a = FilteredReader::wrap_in(Arc::clone(&reader), not_first(), CacheKeyPolicy::Filtered, &table)
            .unwrap();
        let b = FilteredReader::wrap_in(Arc::clone(&reader), not_first(), CacheKeyPolicy::Filtered, &table)
            .unwrap();
        assert_eq!(a.core_key(), b.core_key());
        assert_ne!(a.core_key(), reader.core_key());

        let unique = Predicates::from_fn(CacheKey::unique(), |_| true);
        let c = FilteredReader::wrap_in(Arc::clone(&reader), unique, CacheKeyPolicy::Filtered, &table)
            .unwrap();
        assert_ne!(a.core_key(), c.core_key());

        let passthrough =
            FilteredReader::wrap_in(reader.clone(), not_first(), CacheKeyPolicy::Passthrough, &table)
                .unwrap();
        assert_eq!(passthrough.core_key(), reader.core_key());
    }

    #[test]
    fn test_reopen_rewraps() {
        let index = index();
        let table = IdentityTable::new();
        let view = FilteredReader::wrap_in(index.reader(), not_first(), CacheKeyPolicy::Filtered, &table)
            .unwrap();
        assert!(view.reopen().unwrap().is_none());

        index.delete_document(5);
        let reopened = view.reopen().unwrap().unwrap();
        assert!(reopened.is_deleted(5));
        assert!(reopened.is_deleted(4));
        assert_eq!(reopened.num_docs(), 3);
        assert_ne!(reopened.core_key(), view.core_key());

        // Unchanged segment cores keep their view identity
        let old_leaf = view.sub_readers().unwrap()[0].core_key();
        let new_leaf = reopened.sub_readers().unwrap()[0].core_key();
        assert_eq!(old_leaf, new_leaf);
    }

    #[test]
    fn test_failing_predicate_is_fatal() {
        let index = index();
        let provider = Predicates::per_reader(CacheKey::structural("broken"), |_| {
            Err(Error::Io(std::io::Error::other("stored field unreadable")))
        });
        let err = FilteredReader::wrap_in(
            index.reader(),
            provider,
            CacheKeyPolicy::Filtered,
            &IdentityTable::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Predicate { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_short_bits_rejected() {
        let index = index();
        let provider = Predicates::per_reader(CacheKey::structural("short"), |_| {
            let bits: Arc<dyn Bits> = Arc::new(ConstantBits::all(Some(1)));
            Ok(bits)
        });
        let err = FilteredReader::wrap_in(
            index.reader(),
            provider,
            CacheKeyPolicy::Filtered,
            &IdentityTable::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PredicateLength { expected: 4, actual: 1 }));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_is_deleted_out_of_range_panics() {
        let segment: Arc<dyn IndexReader> = Arc::new(crate::index::MemorySegment::from_documents(&[
            Document::new().text("f", "x"),
        ]));
        let view = FilteredReader::wrap_in(
            segment,
            Predicates::all(),
            CacheKeyPolicy::Filtered,
            &IdentityTable::new(),
        )
        .unwrap();
        view.is_deleted(1);
    }
}
