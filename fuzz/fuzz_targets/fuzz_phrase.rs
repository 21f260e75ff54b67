#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sieve::docset::collect;
use sieve::index::{Document, IndexReader, MemoryIndex};
use sieve::phrase::PhraseFilter;
use std::sync::Arc;

const VOCABULARY: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Arbitrary)]
struct Input {
    docs: Vec<Vec<u8>>,
    phrase: Vec<u8>,
    segment_size: u8,
    deletions: Vec<u16>,
}

fn words(ids: &[u8]) -> Vec<&'static str> {
    ids.iter().map(|&i| VOCABULARY[(i % 4) as usize]).collect()
}

// Compare the phrase matcher against a scan over every document
fuzz_target!(|input: Input| {
    if input.docs.is_empty() || input.phrase.is_empty() || input.phrase.len() > 6 {
        return;
    }
    let segment_size = input.segment_size.max(1) as usize;
    let docs: Vec<Vec<&str>> = input.docs.iter().take(64).map(|d| words(d)).collect();
    let phrase = words(&input.phrase);

    let index = MemoryIndex::new();
    for (i, doc) in docs.iter().enumerate() {
        index.add_document(Document::new().tokens("f", doc));
        if (i + 1) % segment_size == 0 {
            index.commit();
        }
    }
    index.commit();

    let mut deleted = vec![false; docs.len()];
    for &d in &input.deletions {
        let d = d as usize % docs.len();
        index.delete_document(d as u32);
        deleted[d] = true;
    }

    let reader: Arc<dyn IndexReader> = index.reader();
    let matches = PhraseFilter::new("f", &phrase).matches(&reader).unwrap();

    let expected: Vec<u32> = docs
        .iter()
        .enumerate()
        .filter(|(i, doc)| !deleted[*i] && doc.windows(phrase.len()).any(|w| w == phrase.as_slice()))
        .map(|(i, _)| i as u32)
        .collect();
    assert_eq!(collect(matches.as_ref()), expected);
});
