//! Restricting the docs a phrase's first term may contribute.
//!
//! An [`IntersectionProvider`] is asked once per leaf for an [`Intersection`],
//! which then drives the first term's postings to the docs it accepts.

use crate::docset::DocIterator;
use crate::error::Result;
use crate::filter::Filter;
use crate::index::{CacheKey, DocId, IndexReader, NO_MORE_DOCS, Postings};
use crate::predicate::{Bits, BitsProvider};
use std::fmt;
use std::sync::Arc;

/// Moves postings to accepted docs
pub trait Intersection: Send {
    /// Advance `postings` to the next doc this intersection accepts. Returns
    /// that doc, or [`NO_MORE_DOCS`].
    fn next_match(&mut self, postings: &mut dyn Postings) -> Result<DocId>;
}

/// Builds the intersection for a leaf
pub trait IntersectionProvider: Send + Sync + fmt::Debug {
    fn get(&self, leaf: &Arc<dyn IndexReader>) -> Result<Box<dyn Intersection>>;

    fn cache_key(&self) -> CacheKey;
}

/// Accepts every doc of the postings
#[derive(Debug, Default, Clone, Copy)]
pub struct AllDocsIntersection;

struct AllDocs;

impl Intersection for AllDocs {
    fn next_match(&mut self, postings: &mut dyn Postings) -> Result<DocId> {
        postings.next_doc()
    }
}

impl IntersectionProvider for AllDocsIntersection {
    fn get(&self, _leaf: &Arc<dyn IndexReader>) -> Result<Box<dyn Intersection>> {
        Ok(Box::new(AllDocs))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::structural("all")
    }
}

/// Accepts docs whose predicate bit is set
#[derive(Debug)]
pub struct BitsIntersection {
    provider: Arc<dyn BitsProvider>,
}

impl BitsIntersection {
    pub fn new(provider: Arc<dyn BitsProvider>) -> Self {
        Self { provider }
    }
}

struct BitsMatch {
    bits: Arc<dyn Bits>,
}

impl Intersection for BitsMatch {
    fn next_match(&mut self, postings: &mut dyn Postings) -> Result<DocId> {
        loop {
            let doc = postings.next_doc()?;
            if doc == NO_MORE_DOCS {
                return Ok(doc);
            }
            if self.bits.len().is_none_or(|len| doc < len) && self.bits.get(doc) {
                return Ok(doc);
            }
        }
    }
}

impl IntersectionProvider for BitsIntersection {
    fn get(&self, leaf: &Arc<dyn IndexReader>) -> Result<Box<dyn Intersection>> {
        Ok(Box::new(BitsMatch {
            bits: self.provider.get(leaf)?,
        }))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::compose("bits", [&self.provider.cache_key()])
    }
}

/// Accepts docs a filter matches
#[derive(Debug)]
pub struct FilterIntersection {
    filter: Arc<dyn Filter>,
}

impl FilterIntersection {
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        Self { filter }
    }
}

struct NoDocs;

impl Intersection for NoDocs {
    fn next_match(&mut self, _postings: &mut dyn Postings) -> Result<DocId> {
        Ok(NO_MORE_DOCS)
    }
}

/// Leapfrog between the filter's docs and the postings
struct DocSetMatch {
    iter: Box<dyn DocIterator>,
}

impl Intersection for DocSetMatch {
    fn next_match(&mut self, postings: &mut dyn Postings) -> Result<DocId> {
        let mut doc = postings.next_doc()?;
        while doc != NO_MORE_DOCS {
            let other = self.iter.advance(doc);
            if other == doc || other == NO_MORE_DOCS {
                return Ok(other);
            }
            doc = postings.advance(other)?;
        }
        Ok(NO_MORE_DOCS)
    }
}

impl IntersectionProvider for FilterIntersection {
    fn get(&self, leaf: &Arc<dyn IndexReader>) -> Result<Box<dyn Intersection>> {
        Ok(match self.filter.doc_id_set(leaf)? {
            Some(set) => Box::new(DocSetMatch {
                iter: set.iterator(),
            }),
            None => Box::new(NoDocs),
        })
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::compose("filter", [&self.filter.cache_key()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TermsFilter;
    use crate::index::{Document, MemorySegment, Term};
    use crate::predicate::Predicates;

    fn leaf() -> Arc<dyn IndexReader> {
        let docs: Vec<Document> = (0..6)
            .map(|i| {
                Document::new()
                    .text("f", "x")
                    .text("tag", if i % 3 == 0 { "red" } else { "blue" })
            })
            .collect();
        Arc::new(MemorySegment::from_documents(&docs))
    }

    fn drain(intersection: &mut dyn Intersection, leaf: &Arc<dyn IndexReader>) -> Vec<DocId> {
        let mut postings = leaf.postings(&Term::new("f", "x")).unwrap();
        let mut docs = Vec::new();
        loop {
            let doc = intersection.next_match(postings.as_mut()).unwrap();
            if doc == NO_MORE_DOCS {
                return docs;
            }
            assert_eq!(postings.doc(), Some(doc));
            docs.push(doc);
        }
    }

    #[test]
    fn test_all_docs() {
        let leaf = leaf();
        let mut intersection = AllDocsIntersection.get(&leaf).unwrap();
        assert_eq!(drain(intersection.as_mut(), &leaf), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_bits() {
        let leaf = leaf();
        let provider = BitsIntersection::new(Predicates::from_fn(CacheKey::structural("even"), |d| d % 2 == 0));
        let mut intersection = provider.get(&leaf).unwrap();
        assert_eq!(drain(intersection.as_mut(), &leaf), vec![0, 2, 4]);
        assert_eq!(provider.cache_key().to_string(), "bits(even)");
    }

    #[test]
    fn test_filter_leapfrog() {
        let leaf = leaf();
        let provider = FilterIntersection::new(Arc::new(TermsFilter::new([Term::new("tag", "red")])));
        let mut intersection = provider.get(&leaf).unwrap();
        assert_eq!(drain(intersection.as_mut(), &leaf), vec![0, 3]);
    }

    #[derive(Debug)]
    struct NoneFilter;

    impl Filter for NoneFilter {
        fn doc_id_set(
            &self,
            _reader: &Arc<dyn IndexReader>,
        ) -> Result<Option<Arc<dyn crate::docset::DocIdSet>>> {
            Ok(None)
        }

        fn cache_key(&self) -> CacheKey {
            CacheKey::structural("none")
        }
    }

    #[test]
    fn test_filter_without_doc_set_matches_nothing() {
        let leaf = leaf();
        let mut intersection = FilterIntersection::new(Arc::new(NoneFilter)).get(&leaf).unwrap();
        assert!(drain(intersection.as_mut(), &leaf).is_empty());
    }
}
