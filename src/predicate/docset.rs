//! Bridges between predicates and doc sets.

use super::{Bits, BitsProvider, ConstantBits};
use crate::docset::{DocIdSet, DocIterator, FixedBitSetBuilder};
use crate::error::Result;
use crate::filter::Filter;
use crate::filtered::FilteredReader;
use crate::index::{CacheKey, DocId, IndexReader, NO_MORE_DOCS};
use std::fmt;
use std::sync::Arc;

/// Doc set whose docs pass a predicate. Ids past the end of bounded bits do
/// not pass.
pub struct PredicateDocIdSet {
    set: Arc<dyn DocIdSet>,
    bits: Arc<dyn Bits>,
}

impl PredicateDocIdSet {
    pub fn new(set: Arc<dyn DocIdSet>, bits: Arc<dyn Bits>) -> Self {
        Self { set, bits }
    }
}

impl fmt::Debug for PredicateDocIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateDocIdSet")
            .field("set", &self.set)
            .field("bits_len", &self.bits.len())
            .finish()
    }
}

impl DocIdSet for PredicateDocIdSet {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(PredicateIterator {
            inner: self.set.iterator(),
            bits: Arc::clone(&self.bits),
        })
    }

    fn is_cacheable(&self) -> bool {
        false
    }
}

struct PredicateIterator {
    inner: Box<dyn DocIterator>,
    bits: Arc<dyn Bits>,
}

impl PredicateIterator {
    fn passes(&self, doc: DocId) -> bool {
        self.bits.len().is_none_or(|len| doc < len) && self.bits.get(doc)
    }

    fn skip_failing(&mut self, mut doc: DocId) -> DocId {
        while doc != NO_MORE_DOCS && !self.passes(doc) {
            doc = self.inner.next_doc();
        }
        doc
    }
}

impl DocIterator for PredicateIterator {
    fn doc(&self) -> Option<DocId> {
        self.inner.doc()
    }

    fn next_doc(&mut self) -> DocId {
        let doc = self.inner.next_doc();
        self.skip_failing(doc)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        let doc = self.inner.advance(target);
        self.skip_failing(doc)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

/// Random-access bits of a cacheable doc set
struct DocSetBits {
    set: Arc<dyn DocIdSet>,
}

impl Bits for DocSetBits {
    fn get(&self, index: u32) -> bool {
        self.set.bits().is_some_and(|bits| bits.get(index))
    }

    fn len(&self) -> Option<u32> {
        self.set.bits().and_then(|bits| bits.len())
    }
}

/// A filter seen as a predicate: a doc passes when the filter matches it
#[derive(Debug)]
pub struct FilterBitsProvider {
    filter: Arc<dyn Filter>,
}

impl FilterBitsProvider {
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        Self { filter }
    }
}

impl BitsProvider for FilterBitsProvider {
    fn get(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> {
        let max_doc = reader.max_doc();
        let Some(set) = self.filter.doc_id_set(reader)? else {
            return Ok(Arc::new(ConstantBits::none(Some(max_doc))));
        };
        if set.is_cacheable() && set.bits().is_some() {
            return Ok(Arc::new(DocSetBits { set }));
        }
        let mut builder = FixedBitSetBuilder::new(max_doc);
        builder.or_iter(set.iterator().as_mut());
        Ok(Arc::new(builder.freeze()))
    }

    fn cache_key(&self) -> CacheKey {
        self.filter.cache_key()
    }
}

/// The docs of `filter` that also pass `provider`
#[derive(Debug)]
pub struct PredicateFilter {
    filter: Arc<dyn Filter>,
    provider: Arc<dyn BitsProvider>,
}

impl PredicateFilter {
    pub fn new(filter: Arc<dyn Filter>, provider: Arc<dyn BitsProvider>) -> Self {
        Self { filter, provider }
    }
}

impl Filter for PredicateFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        let Some(set) = self.filter.doc_id_set(reader)? else {
            return Ok(None);
        };
        let bits = self.provider.get(reader)?;
        Ok(Some(Arc::new(PredicateDocIdSet::new(set, bits))))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::compose(
            "predicate",
            [&self.filter.cache_key(), &self.provider.cache_key()],
        )
    }
}

/// Evaluates `filter` against the reader already narrowed by `provider`, so
/// the filter never sees docs the predicate rejects
#[derive(Debug)]
pub struct PrePredicateFilter {
    filter: Arc<dyn Filter>,
    provider: Arc<dyn BitsProvider>,
}

impl PrePredicateFilter {
    pub fn new(filter: Arc<dyn Filter>, provider: Arc<dyn BitsProvider>) -> Self {
        Self { filter, provider }
    }
}

impl Filter for PrePredicateFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        let filtered: Arc<dyn IndexReader> =
            FilteredReader::wrap(Arc::clone(reader), Arc::clone(&self.provider))?;
        self.filter.doc_id_set(&filtered)
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::compose(
            "pre_predicate",
            [&self.filter.cache_key(), &self.provider.cache_key()],
        )
    }
}
