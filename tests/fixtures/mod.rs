//! Shared sample indexes for the integration tests.

#![allow(dead_code)]

use sieve::index::{Document, IndexReader, MemoryIndex};
use std::sync::Arc;

pub const FIELD: &str = "body";

/// The three documents most tests start from
pub const SAMPLE: [&str; 3] = [
    "i love to say hello world to everyone",
    "i hate to say world hello to anyone",
    "hello hello world world",
];

/// Index `texts` into `body`, committing after every `segment_size` docs
pub fn index_of(texts: &[&str], segment_size: usize) -> MemoryIndex {
    let index = MemoryIndex::new();
    for (i, text) in texts.iter().enumerate() {
        index.add_document(Document::new().text(FIELD, text));
        if (i + 1) % segment_size == 0 {
            index.commit();
        }
    }
    index.commit();
    index
}

pub fn sample_index() -> MemoryIndex {
    index_of(&SAMPLE, SAMPLE.len())
}

pub fn reader(index: &MemoryIndex) -> Arc<dyn IndexReader> {
    index.reader()
}

/// Docs whose text contains `phrase` as consecutive words
pub fn naive_phrase(texts: &[&str], phrase: &[&str]) -> Vec<u32> {
    texts
        .iter()
        .enumerate()
        .filter(|(_, text)| {
            let words = sieve::utils::words(text);
            !phrase.is_empty()
                && words.windows(phrase.len()).any(|w| w.iter().zip(phrase).all(|(a, b)| a == b))
        })
        .map(|(i, _)| i as u32)
        .collect()
}
