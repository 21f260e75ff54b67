//! Exact phrase matching over term positions.
//!
//! Each leaf is evaluated on its own. Terms are visited rarest first: the
//! rarest term seeds a [`MatchList`] of candidate docs with normalized
//! positions, every further term narrows it in place, and the leaf stops as
//! soon as no candidate is left. Survivors of all leaves are rebased to global
//! ids and returned as a dense or sparse doc set depending on how many there
//! are.

pub mod intersection;
pub mod matches;

pub use intersection::{
    AllDocsIntersection, BitsIntersection, FilterIntersection, Intersection, IntersectionProvider,
};
pub use matches::{MatchList, PositionList};

use crate::config::PhraseConfig;
use crate::docset::{self, DocIdSet, FixedBitSetBuilder, SortedDocSet};
use crate::error::Result;
use crate::filter::Filter;
use crate::index::{
    CacheKey, DocId, IndexReader, LeafContext, NO_MORE_DOCS, Term, gather_leaves,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Docs containing the terms consecutively, in order
pub struct PhraseFilter {
    field: String,
    terms: Vec<Term>,
    intersection: Arc<dyn IntersectionProvider>,
    config: PhraseConfig,
}

impl PhraseFilter {
    pub fn new<S: AsRef<str>>(field: &str, terms: &[S]) -> Self {
        Self {
            field: field.to_string(),
            terms: terms.iter().map(|t| Term::new(field, t.as_ref())).collect(),
            intersection: Arc::new(AllDocsIntersection),
            config: PhraseConfig::default(),
        }
    }

    /// Only docs the intersection accepts can match
    pub fn with_intersection(mut self, intersection: Arc<dyn IntersectionProvider>) -> Self {
        self.intersection = intersection;
        self
    }

    pub fn with_config(mut self, config: PhraseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Matching docs of `reader`, in global ids
    pub fn matches(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn DocIdSet>> {
        if self.terms.is_empty() {
            return Ok(docset::empty());
        }

        let leaves = gather_leaves(reader);
        let per_leaf = self.match_leaves(&leaves)?;

        let total: usize = per_leaf.iter().map(Vec::len).sum();
        let max_doc = reader.max_doc();
        if total == 0 {
            return Ok(docset::empty());
        }

        // Shifts of 32 or more leave no sparse range
        let threshold = max_doc.checked_shr(self.config.dense_shift).unwrap_or(0);
        let dense = total as u64 > threshold as u64;
        debug!(
            phrase = %self.description(),
            leaves = leaves.len(),
            matches = total,
            dense,
            "phrase matched"
        );
        let rebased = leaves
            .iter()
            .zip(&per_leaf)
            .flat_map(|(leaf, docs)| docs.iter().map(move |&d| d + leaf.doc_base));

        if dense {
            let mut builder = FixedBitSetBuilder::new(max_doc);
            for doc in rebased {
                builder.set(doc);
            }
            Ok(Arc::new(builder.freeze()))
        } else {
            Ok(Arc::new(SortedDocSet::new(rebased.collect())))
        }
    }

    #[cfg(feature = "parallel")]
    fn match_leaves(&self, leaves: &[LeafContext<'_>]) -> Result<Vec<Vec<DocId>>> {
        use rayon::prelude::*;

        if self.config.parallel_leaves {
            // Collecting an indexed parallel iterator keeps leaf order
            leaves.par_iter().map(|leaf| self.match_leaf(leaf)).collect()
        } else {
            leaves.iter().map(|leaf| self.match_leaf(leaf)).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn match_leaves(&self, leaves: &[LeafContext<'_>]) -> Result<Vec<Vec<DocId>>> {
        leaves.iter().map(|leaf| self.match_leaf(leaf)).collect()
    }

    /// Local ids of the leaf's docs containing the phrase
    fn match_leaf(&self, leaf: &LeafContext<'_>) -> Result<Vec<DocId>> {
        let reader = leaf.reader;

        // (doc freq, phrase offset); ties keep phrase order
        let mut order = Vec::with_capacity(self.terms.len());
        for (offset, term) in self.terms.iter().enumerate() {
            order.push((reader.doc_freq(term)?, offset));
        }
        if self.config.frequency_order {
            order.sort_unstable();
        }

        let mut matches: Option<MatchList> = None;
        for &(doc_freq, offset) in &order {
            if doc_freq == 0 {
                debug!(leaf = leaf.ord, term = %self.terms[offset], "term absent from leaf");
                return Ok(Vec::new());
            }
            let term = &self.terms[offset];
            let mut postings = reader.postings(term)?;
            let offset = offset as i64;

            match matches.as_mut() {
                None => {
                    let mut seeded = MatchList::with_capacity(doc_freq as usize);
                    let mut intersection = self.intersection.get(reader)?;
                    loop {
                        let doc = intersection.next_match(postings.as_mut())?;
                        if doc == NO_MORE_DOCS {
                            break;
                        }
                        seeded.push(doc, PositionList::read(postings.as_mut(), offset)?);
                    }
                    matches = Some(seeded);
                }
                Some(candidates) => candidates.intersect(postings.as_mut(), offset)?,
            }

            if matches.as_ref().is_some_and(MatchList::is_empty) {
                break;
            }
        }

        let docs = matches.map(MatchList::into_docs).unwrap_or_default();
        debug!(
            leaf = leaf.ord,
            doc_base = leaf.doc_base,
            order = ?order,
            survivors = docs.len(),
            "phrase leaf evaluated"
        );
        Ok(docs)
    }

    fn description(&self) -> String {
        let texts: Vec<&str> = self.terms.iter().map(|t| t.text.as_str()).collect();
        format!("{}:\"{}\"", self.field, texts.join(" "))
    }
}

impl fmt::Debug for PhraseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhraseFilter")
            .field("phrase", &self.description())
            .field("intersection", &self.intersection)
            .finish()
    }
}

impl Filter for PhraseFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        self.matches(reader).map(Some)
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::structural(format!(
            "phrase({}|{})",
            self.description(),
            self.intersection.cache_key()
        ))
    }
}
