//! Many threads racing on one cache entry.

use sieve::Error;
use sieve::cache::DocSetCache;
use sieve::docset::{DocIdSet, SortedDocSet, collect};
use sieve::index::{CacheKey, CoreKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 16;

#[test]
fn test_one_computation_for_many_threads() {
    let cache: DocSetCache = DocSetCache::new();
    let core = CoreKey::new();
    let computations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = cache.clone();
            let core = core.clone();
            let computations = Arc::clone(&computations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compute(&core, CacheKey::structural("shared"), || {
                        computations.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        let set: Arc<dyn DocIdSet> = Arc::new(SortedDocSet::new(vec![3, 5, 8]));
                        Ok(set)
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<Arc<dyn DocIdSet>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    for set in &results {
        assert!(Arc::ptr_eq(set, &results[0]));
        assert_eq!(collect(set.as_ref()), vec![3, 5, 8]);
    }

    let stats = cache.stats();
    assert_eq!(stats.computations, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, THREADS as u64 - 1);
}

#[test]
fn test_failure_reaches_every_waiter() {
    let cache: DocSetCache = DocSetCache::new();
    let core = CoreKey::new();
    let computations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = cache.clone();
            let core = core.clone();
            let computations = Arc::clone(&computations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compute(&core, CacheKey::structural("broken"), || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    Err(Error::Config("boom".to_string()))
                })
            })
        })
        .collect();

    let mut leaders = 0;
    let mut waiters = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Err(Error::Config(msg)) => {
                assert_eq!(msg, "boom");
                leaders += 1;
            }
            Err(Error::Shared(inner)) => {
                assert!(matches!(inner.as_ref(), Error::Config(msg) if msg == "boom"));
                waiters += 1;
            }
            other => panic!("unexpected result {:?}", other.map(|s| collect(s.as_ref()))),
        }
    }
    // a thread arriving after the failure cleared the slot computes again
    assert_eq!(leaders, computations.load(Ordering::SeqCst));
    assert_eq!(leaders + waiters, THREADS);
}

#[test]
fn test_entries_dropped_when_generation_closes() {
    let cache: DocSetCache = DocSetCache::new();
    let core = CoreKey::new();
    cache
        .get_or_compute(&core, CacheKey::structural("a"), || {
            let set: Arc<dyn DocIdSet> = Arc::new(SortedDocSet::new(vec![1]));
            Ok(set)
        })
        .unwrap();
    assert_eq!(cache.len(), 1);
    drop(core);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 1);
}
