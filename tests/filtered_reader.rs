//! Filtered views over multi-segment indexes.

mod fixtures;

use fixtures::{FIELD, SAMPLE, index_of, reader};
use sieve::cache::{CachingFilter, DocSetCache};
use sieve::docset::collect;
use sieve::filter::{Filter, TermsFilter};
use sieve::filtered::{CacheKeyPolicy, FilteredReader, IdentityTable};
use sieve::index::{CacheKey, IndexReader, Term, gather_leaves};
use sieve::phrase::PhraseFilter;
use sieve::predicate::{BitsProvider, FilterBitsProvider, PrePredicateFilter, Predicates};
use std::sync::Arc;

fn has_word(word: &str) -> Arc<dyn BitsProvider> {
    Arc::new(FilterBitsProvider::new(Arc::new(TermsFilter::new([
        Term::new(FIELD, word),
    ]))))
}

#[test]
fn test_liveness_combines_deletions_and_predicate() {
    let index = index_of(&SAMPLE, 2);
    index.delete_document(0);
    let inner = reader(&index);

    // "hello" is in every doc; doc 0 is deleted
    let view: Arc<dyn IndexReader> = FilteredReader::wrap(Arc::clone(&inner), has_word("hello")).unwrap();
    assert_eq!(view.max_doc(), 3);
    assert_eq!(view.num_docs(), 2);
    assert!(view.is_deleted(0));
    assert!(!view.is_deleted(1));
    assert!(!view.is_deleted(2));

    // "say" is in docs 0 and 1
    let view: Arc<dyn IndexReader> = FilteredReader::wrap(inner, has_word("say")).unwrap();
    assert_eq!(view.num_docs(), 1);
    assert!(view.is_deleted(0));
    assert!(!view.is_deleted(1));
    assert!(view.is_deleted(2));
}

#[test]
fn test_phrase_over_filtered_view() {
    let index = index_of(&SAMPLE, 1);
    let inner = reader(&index);
    let view: Arc<dyn IndexReader> = FilteredReader::wrap(inner, has_word("love")).unwrap();
    assert_eq!(gather_leaves(&view).len(), 3);

    let matches = PhraseFilter::new(FIELD, &["hello", "world"]).matches(&view).unwrap();
    assert_eq!(collect(matches.as_ref()), vec![0]);
}

#[test]
fn test_identity_is_stable_across_wraps() {
    let table = IdentityTable::new();
    let index = index_of(&SAMPLE, 3);
    let inner = reader(&index);
    let provider = Predicates::from_fn(CacheKey::structural("even"), |d| d % 2 == 0);

    let a = FilteredReader::wrap_in(Arc::clone(&inner), Arc::clone(&provider), CacheKeyPolicy::Filtered, &table).unwrap();
    let b = FilteredReader::wrap_in(Arc::clone(&inner), Arc::clone(&provider), CacheKeyPolicy::Filtered, &table).unwrap();
    assert_eq!(a.core_key().id(), b.core_key().id());
    assert_ne!(a.core_key().id(), inner.core_key().id());

    let other = Predicates::from_fn(CacheKey::structural("odd"), |d| d % 2 == 1);
    let c = FilteredReader::wrap_in(Arc::clone(&inner), other, CacheKeyPolicy::Filtered, &table).unwrap();
    assert_ne!(a.core_key().id(), c.core_key().id());

    let passthrough = FilteredReader::wrap_in(Arc::clone(&inner), provider, CacheKeyPolicy::Passthrough, &table).unwrap();
    assert_eq!(passthrough.core_key().id(), inner.core_key().id());
}

#[test]
fn test_cache_hits_through_equal_views() {
    let table = IdentityTable::new();
    let index = index_of(&SAMPLE, 3);
    let inner = reader(&index);
    let cache = DocSetCache::new();
    let filter = CachingFilter::with_cache(
        Arc::new(TermsFilter::new([Term::new(FIELD, "world")])),
        cache.clone(),
    );

    let mut views: Vec<Arc<dyn IndexReader>> = Vec::new();
    for _ in 0..3 {
        let view: Arc<dyn IndexReader> = FilteredReader::wrap_in(
            Arc::clone(&inner),
            has_word("to"),
            CacheKeyPolicy::Filtered,
            &table,
        )
        .unwrap();
        let set = filter.doc_id_set(&view).unwrap().unwrap();
        assert_eq!(collect(set.as_ref()), vec![0, 1]);
        views.push(view);
    }
    let stats = cache.stats();
    assert_eq!(stats.computations, 1);
    assert_eq!(stats.hits, 2);

    // Entries keyed on the views go once the last view is gone
    assert_eq!(cache.len(), 1);
    drop(views);
    assert!(cache.is_empty());
    assert!(table.is_empty());
}

#[test]
fn test_transient_views_leave_nothing_behind() {
    let table = IdentityTable::new();
    let index = index_of(&SAMPLE, 1);
    let inner = reader(&index);
    let cache = DocSetCache::new();
    let filter = CachingFilter::with_cache(
        Arc::new(TermsFilter::new([Term::new(FIELD, "hello")])),
        cache.clone(),
    );

    for i in 0..200u32 {
        let provider = Predicates::from_fn(CacheKey::unique(), move |d| d != i % 2);
        let view: Arc<dyn IndexReader> =
            FilteredReader::wrap_in(Arc::clone(&inner), provider, CacheKeyPolicy::Filtered, &table)
                .unwrap();
        filter.doc_id_set(&view).unwrap();
        // one composite and three leaf identities
        assert_eq!(table.len(), 4);
    }
    assert!(table.is_empty());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 200);
}

#[test]
fn test_pre_predicate_filter() {
    let index = index_of(&SAMPLE, 2);
    let inner = reader(&index);
    let filter = PrePredicateFilter::new(
        Arc::new(PhraseFilter::new(FIELD, &["to", "say"])),
        has_word("hate"),
    );
    let set = filter.doc_id_set(&inner).unwrap().unwrap();
    assert_eq!(collect(set.as_ref()), vec![1]);
}

#[test]
fn test_reopen_follows_the_index() {
    let index = index_of(&SAMPLE, 3);
    let inner = reader(&index);
    let view = FilteredReader::wrap(Arc::clone(&inner), has_word("world")).unwrap();
    assert!(view.reopen().unwrap().is_none());

    index.delete_document(1);
    let reopened = view.reopen().unwrap().unwrap();
    assert_eq!(reopened.num_docs(), 2);
    assert!(reopened.is_deleted(1));
}

#[test]
fn test_failing_predicate_surfaces() {
    let index = index_of(&SAMPLE, 3);
    let inner = reader(&index);
    let failing = Predicates::per_reader(CacheKey::structural("broken"), |_| {
        Err(sieve::Error::Config("no such field".to_string()))
    });
    let err = FilteredReader::wrap(inner, failing).unwrap_err();
    assert!(matches!(err, sieve::Error::Predicate { .. }));
}
