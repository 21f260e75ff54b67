//! Filters over the terms a doc contains.

use super::Filter;
use crate::docset::{DocIdSet, FixedBitSetBuilder};
use crate::error::Result;
use crate::index::{CacheKey, IndexReader, NO_MORE_DOCS, Postings, Term};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set the bit of every doc in `postings`
fn union_postings(builder: &mut FixedBitSetBuilder, postings: &mut dyn Postings) -> Result<()> {
    loop {
        let doc = postings.next_doc()?;
        if doc == NO_MORE_DOCS {
            return Ok(());
        }
        builder.set(doc);
    }
}

/// Docs containing any of a set of terms
#[derive(Debug, Clone)]
pub struct TermsFilter {
    terms: BTreeSet<Term>,
    key: CacheKey,
}

impl TermsFilter {
    pub fn new(terms: impl IntoIterator<Item = Term>) -> Self {
        let terms: BTreeSet<Term> = terms.into_iter().collect();
        let parts: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        let key = CacheKey::structural(format!("terms({})", parts.join(",")));
        Self { terms, key }
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }
}

impl Filter for TermsFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        let mut builder = FixedBitSetBuilder::new(reader.max_doc());
        for term in &self.terms {
            union_postings(&mut builder, reader.postings(term)?.as_mut())?;
        }
        Ok(Some(Arc::new(builder.freeze())))
    }

    fn cache_key(&self) -> CacheKey {
        self.key.clone()
    }
}

/// Docs containing a term of `field` that starts with `prefix`
#[derive(Debug, Clone)]
pub struct PrefixFilter {
    field: String,
    prefix: String,
}

impl PrefixFilter {
    pub fn new(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            prefix: prefix.into(),
        }
    }
}

impl Filter for PrefixFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<Arc<dyn DocIdSet>>> {
        let mut builder = FixedBitSetBuilder::new(reader.max_doc());
        let terms = reader.terms(&self.field)?;
        // Terms are sorted, so matches form one contiguous run
        let first = terms.partition_point(|t| t.text.as_str() < self.prefix.as_str());
        for term in terms[first..]
            .iter()
            .take_while(|t| t.text.starts_with(&self.prefix))
        {
            union_postings(&mut builder, reader.postings(term)?.as_mut())?;
        }
        Ok(Some(Arc::new(builder.freeze())))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::structural(format!("prefix({}:{}*)", self.field, self.prefix))
    }
}
