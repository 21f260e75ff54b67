//! Filters: computations from a reader to a doc set.
//!
//! A filter returning `None` matches nothing for that reader. Combinators in
//! [`Filters`] treat `None` inputs as "no constraint" and never allocate a
//! combination for fewer than two inputs.

pub mod terms;

pub use terms::{PrefixFilter, TermsFilter};

use crate::docset::{self, AllDocSet, BooleanDocSet, DocIdSet};
use crate::error::Result;
use crate::index::{CacheKey, IndexReader};
use crate::predicate::{Clause, Occur, clauses_key};
use std::fmt;
use std::sync::Arc;

/// Computes the docs of a reader that pass
pub trait Filter: Send + Sync + fmt::Debug {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>>;

    /// Equal for filters that always compute the same docs
    fn cache_key(&self) -> CacheKey;
}

/// Filter combinators
pub struct Filters;

impl Filters {
    /// Docs passing every filter. `None` entries are ignored; with no filters
    /// left the result is `None`, with one it is that filter.
    pub fn and(
        filters: impl IntoIterator<Item = Option<Arc<dyn Filter>>>,
    ) -> Option<Arc<dyn Filter>> {
        Self::combine(filters, Occur::Must)
    }

    /// Docs passing any filter, with the same `None` handling as [`Filters::and`]
    pub fn or(
        filters: impl IntoIterator<Item = Option<Arc<dyn Filter>>>,
    ) -> Option<Arc<dyn Filter>> {
        Self::combine(filters, Occur::Should)
    }

    /// Docs not passing `filter`
    pub fn not(filter: Arc<dyn Filter>) -> Arc<dyn Filter> {
        Arc::new(BooleanFilter::new(vec![Clause::must_not(filter)]))
    }

    fn combine(
        filters: impl IntoIterator<Item = Option<Arc<dyn Filter>>>,
        occur: Occur,
    ) -> Option<Arc<dyn Filter>> {
        let mut filters: Vec<Arc<dyn Filter>> = filters.into_iter().flatten().collect();
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => {
                let clauses = filters
                    .into_iter()
                    .map(|f| Clause::new(f, occur))
                    .collect();
                Some(Arc::new(BooleanFilter::new(clauses)))
            }
        }
    }
}

/// Filters combined by occurrence; evaluates to a lazy [`BooleanDocSet`]
pub struct BooleanFilter {
    clauses: Vec<Clause<Arc<dyn Filter>>>,
    key: CacheKey,
}

impl BooleanFilter {
    pub fn new(clauses: Vec<Clause<Arc<dyn Filter>>>) -> Self {
        let keys: Vec<(Occur, CacheKey)> = clauses
            .iter()
            .map(|c| (c.occur, c.value.cache_key()))
            .collect();
        let key = clauses_key("filter", keys.iter().map(|(occur, key)| (*occur, key)));
        Self { clauses, key }
    }

    pub fn builder() -> BooleanFilterBuilder {
        BooleanFilterBuilder::default()
    }

    pub fn clauses(&self) -> &[Clause<Arc<dyn Filter>>] {
        &self.clauses
    }
}

impl fmt::Debug for BooleanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BooleanFilter({})", self.key)
    }
}

impl Filter for BooleanFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let set = clause
                .value
                .doc_id_set(reader)?
                .unwrap_or_else(docset::empty);
            clauses.push(Clause::new(set, clause.occur));
        }
        Ok(Some(Arc::new(BooleanDocSet::new(clauses, reader.max_doc()))))
    }

    fn cache_key(&self) -> CacheKey {
        self.key.clone()
    }
}

/// Accumulates clauses; `None` arguments are skipped
#[derive(Default)]
pub struct BooleanFilterBuilder {
    clauses: Vec<Clause<Arc<dyn Filter>>>,
}

impl BooleanFilterBuilder {
    fn push(mut self, filter: Option<Arc<dyn Filter>>, occur: Occur) -> Self {
        if let Some(filter) = filter {
            self.clauses.push(Clause::new(filter, occur));
        }
        self
    }

    pub fn must(self, filter: impl Into<Option<Arc<dyn Filter>>>) -> Self {
        self.push(filter.into(), Occur::Must)
    }

    pub fn should(self, filter: impl Into<Option<Arc<dyn Filter>>>) -> Self {
        self.push(filter.into(), Occur::Should)
    }

    pub fn must_not(self, filter: impl Into<Option<Arc<dyn Filter>>>) -> Self {
        self.push(filter.into(), Occur::MustNot)
    }

    pub fn build(self) -> BooleanFilter {
        BooleanFilter::new(self.clauses)
    }
}

/// Every doc of the reader, deleted ones included
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchAllFilter;

impl Filter for MatchAllFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        Ok(Some(Arc::new(AllDocSet::new(reader.max_doc()))))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::structural("*")
    }
}
