//! Dense doc sets: one bit per doc in `u64` words.

use super::{DocIdSet, DocIterator};
use crate::index::{DocId, NO_MORE_DOCS};
use crate::predicate::Bits;
use roaring::RoaringBitmap;
use std::fmt;
use std::sync::Arc;

const WORD_BITS: u32 = 64;

fn word_count(len: u32) -> usize {
    len.div_ceil(WORD_BITS) as usize
}

/// Mutable bit set under construction. Frozen into a [`FixedBitSet`] once
/// filled; nothing mutates a set after that.
#[derive(Debug, Clone)]
pub struct FixedBitSetBuilder {
    words: Vec<u64>,
    len: u32,
}

impl FixedBitSetBuilder {
    /// All bits clear, sized for `len` docs
    pub fn new(len: u32) -> Self {
        Self {
            words: vec![0; word_count(len)],
            len,
        }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn check(&self, index: u32) {
        assert!(
            index < self.len,
            "bit {} out of range [0, {})",
            index,
            self.len
        );
    }

    #[inline]
    pub fn set(&mut self, index: u32) {
        self.check(index);
        self.words[(index / WORD_BITS) as usize] |= 1u64 << (index % WORD_BITS);
    }

    #[inline]
    pub fn clear(&mut self, index: u32) {
        self.check(index);
        self.words[(index / WORD_BITS) as usize] &= !(1u64 << (index % WORD_BITS));
    }

    #[inline]
    pub fn get(&self, index: u32) -> bool {
        self.check(index);
        self.words[(index / WORD_BITS) as usize] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Set every bit in `start..end`
    pub fn set_range(&mut self, start: u32, end: u32) {
        assert!(
            start <= end && end <= self.len,
            "range {}..{} out of bounds for {} bits",
            start,
            end,
            self.len
        );
        let mut index = start;
        // Partial leading word, then whole words, then the tail
        while index < end && index % WORD_BITS != 0 {
            self.set(index);
            index += 1;
        }
        while end - index >= WORD_BITS {
            self.words[(index / WORD_BITS) as usize] = u64::MAX;
            index += WORD_BITS;
        }
        while index < end {
            self.set(index);
            index += 1;
        }
    }

    /// Union in every doc an iterator yields. Ids past `len` panic.
    pub fn or_iter(&mut self, iter: &mut dyn DocIterator) {
        loop {
            let doc = iter.next_doc();
            if doc == NO_MORE_DOCS {
                break;
            }
            self.set(doc);
        }
    }

    pub fn freeze(self) -> FixedBitSet {
        let cardinality = self.words.iter().map(|w| w.count_ones()).sum();
        FixedBitSet {
            words: Arc::from(self.words),
            len: self.len,
            cardinality,
        }
    }
}

/// Immutable dense doc set
#[derive(Clone)]
pub struct FixedBitSet {
    words: Arc<[u64]>,
    len: u32,
    cardinality: u32,
}

impl FixedBitSet {
    /// Set containing exactly `docs`, sized for `len`
    pub fn from_docs(len: u32, docs: impl IntoIterator<Item = DocId>) -> Self {
        let mut builder = FixedBitSetBuilder::new(len);
        for doc in docs {
            builder.set(doc);
        }
        builder.freeze()
    }

    #[inline]
    pub fn get(&self, index: u32) -> bool {
        assert!(
            index < self.len,
            "bit {} out of range [0, {})",
            index,
            self.len
        );
        self.words[(index / WORD_BITS) as usize] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Number of bits, i.e. the doc count the set is sized for
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of set bits
    pub fn cardinality(&self) -> u32 {
        self.cardinality
    }

    /// Set bits in increasing order
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let base = i as u32 * WORD_BITS;
            SetBits(word).map(move |bit| base + bit)
        })
    }

    pub fn to_roaring(&self) -> RoaringBitmap {
        self.iter().collect()
    }
}

impl fmt::Debug for FixedBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBitSet")
            .field("len", &self.len)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// Positions of the set bits of one word, lowest first
struct SetBits(u64);

impl Iterator for SetBits {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

impl Bits for FixedBitSet {
    fn get(&self, index: u32) -> bool {
        FixedBitSet::get(self, index)
    }

    fn len(&self) -> Option<u32> {
        Some(self.len)
    }
}

impl DocIdSet for FixedBitSet {
    fn iterator(&self) -> Box<dyn DocIterator> {
        Box::new(BitSetIterator {
            words: Arc::clone(&self.words),
            len: self.len,
            cardinality: self.cardinality,
            doc: None,
        })
    }

    fn is_cacheable(&self) -> bool {
        true
    }

    fn bits(&self) -> Option<&dyn Bits> {
        Some(self)
    }
}

/// Iterator sharing the frozen words
struct BitSetIterator {
    words: Arc<[u64]>,
    len: u32,
    cardinality: u32,
    doc: Option<DocId>,
}

impl BitSetIterator {
    /// First set bit at or after `from`
    fn seek(&mut self, from: u32) -> DocId {
        let doc = self.next_set_bit(from).unwrap_or(NO_MORE_DOCS);
        self.doc = Some(doc);
        doc
    }

    fn next_set_bit(&self, from: u32) -> Option<u32> {
        if from >= self.len {
            return None;
        }
        let mut word_index = (from / WORD_BITS) as usize;
        // Mask off bits below `from` in the first word
        let mut word = self.words[word_index] & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                let bit = word_index as u32 * WORD_BITS + word.trailing_zeros();
                return (bit < self.len).then_some(bit);
            }
            word_index += 1;
            if word_index >= self.words.len() {
                return None;
            }
            word = self.words[word_index];
        }
    }
}

impl DocIterator for BitSetIterator {
    fn doc(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> DocId {
        match self.doc {
            None => self.seek(0),
            Some(NO_MORE_DOCS) => NO_MORE_DOCS,
            Some(doc) => self.seek(doc + 1),
        }
    }

    fn advance(&mut self, target: DocId) -> DocId {
        match self.doc {
            Some(doc) if doc >= target => doc,
            _ => self.seek(target),
        }
    }

    fn cost(&self) -> u64 {
        self.cardinality as u64
    }
}
