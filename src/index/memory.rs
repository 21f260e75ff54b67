//! In-memory reference engine.
//!
//! Documents are buffered by [`MemoryIndex::add_document`] and sealed into an
//! immutable [`MemorySegment`] on [`MemoryIndex::commit`]. Deletions are kept
//! beside the segment core as a copy-on-write roaring bitmap, so a segment
//! keeps its [`CoreKey`] when only its deletions change. Each commit or
//! delete starts a new generation; [`MemoryIndex::reader`] returns the
//! composite for the current generation.

use crate::error::Result;
use crate::index::core_key::CoreKey;
use crate::index::multi::{CompositeReader, GenerationSource};
use crate::index::reader::{IndexReader, Postings};
use crate::index::types::*;
use crate::utils::tokenize;
use ahash::AHashMap;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// A document to index: fields with their tokens in position order.
/// `None` tokens occupy a position without being indexed.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, Vec<Option<String>>)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `text` to `field`, tokenized
    pub fn text(mut self, field: &str, text: &str) -> Self {
        self.fields.push((field.to_string(), tokenize(text)));
        self
    }

    /// Add pre-tokenized terms to `field`
    pub fn tokens<S: AsRef<str>>(mut self, field: &str, tokens: &[S]) -> Self {
        let tokens = tokens.iter().map(|t| Some(t.as_ref().to_string())).collect();
        self.fields.push((field.to_string(), tokens));
        self
    }
}

/// Postings of one term inside one segment
#[derive(Debug, Default)]
struct TermPostings {
    docs: Vec<DocId>,
    /// `positions[position_starts[i]..position_starts[i + 1]]` belong to `docs[i]`
    position_starts: Vec<u32>,
    positions: Vec<Position>,
}

impl TermPostings {
    fn push(&mut self, doc: DocId, position: Position) {
        if self.docs.last() != Some(&doc) {
            self.docs.push(doc);
            self.position_starts.push(self.positions.len() as u32);
        }
        self.positions.push(position);
    }

    fn seal(&mut self) {
        self.position_starts.push(self.positions.len() as u32);
    }

    fn positions_of(&self, index: usize) -> &[Position] {
        let start = self.position_starts[index] as usize;
        let end = self.position_starts[index + 1] as usize;
        &self.positions[start..end]
    }
}

/// Immutable part of a segment
struct SegmentCore {
    core_key: CoreKey,
    max_doc: u32,
    postings: AHashMap<Term, TermPostings>,
    /// Sorted terms per field
    field_terms: AHashMap<String, Vec<Term>>,
}

impl SegmentCore {
    fn build(documents: &[Document]) -> Self {
        let mut accumulated: BTreeMap<Term, TermPostings> = BTreeMap::new();

        for (doc_id, document) in documents.iter().enumerate() {
            let doc_id = doc_id as DocId;
            // Repeated fields continue where the previous value ended
            let mut next_position: AHashMap<&str, Position> = AHashMap::new();
            for (field, tokens) in &document.fields {
                let start = next_position.entry(field.as_str()).or_insert(0);
                for (offset, token) in tokens.iter().enumerate() {
                    if let Some(token) = token {
                        accumulated
                            .entry(Term::new(field.as_str(), token.as_str()))
                            .or_default()
                            .push(doc_id, *start + offset as Position);
                    }
                }
                *start += tokens.len() as Position;
            }
        }

        let mut postings = AHashMap::with_capacity(accumulated.len());
        let mut field_terms: AHashMap<String, Vec<Term>> = AHashMap::new();
        // BTreeMap order keeps each field's term list sorted
        for (term, mut term_postings) in accumulated {
            term_postings.seal();
            field_terms
                .entry(term.field.clone())
                .or_default()
                .push(term.clone());
            postings.insert(term, term_postings);
        }

        Self {
            core_key: CoreKey::new(),
            max_doc: documents.len() as u32,
            postings,
            field_terms,
        }
    }
}

/// A sealed segment plus its deletions
#[derive(Clone)]
pub struct MemorySegment {
    core: Arc<SegmentCore>,
    deletions: Arc<RoaringBitmap>,
}

impl MemorySegment {
    /// Seal documents into a standalone segment
    pub fn from_documents(documents: &[Document]) -> Self {
        Self {
            core: Arc::new(SegmentCore::build(documents)),
            deletions: Arc::new(RoaringBitmap::new()),
        }
    }

    /// Same core, with `doc` additionally deleted
    pub fn with_deletion(&self, doc: DocId) -> Self {
        assert!(
            doc < self.core.max_doc,
            "doc id {} out of range [0, {})",
            doc,
            self.core.max_doc
        );
        let mut deletions = (*self.deletions).clone();
        deletions.insert(doc);
        Self {
            core: Arc::clone(&self.core),
            deletions: Arc::new(deletions),
        }
    }

    pub fn deletions(&self) -> &RoaringBitmap {
        &self.deletions
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySegment")
            .field("core", &self.core.core_key)
            .field("max_doc", &self.core.max_doc)
            .field("deleted", &self.deletions.len())
            .field("terms", &self.core.postings.len())
            .finish()
    }
}

impl IndexReader for MemorySegment {
    fn max_doc(&self) -> u32 {
        self.core.max_doc
    }

    fn num_docs(&self) -> u32 {
        self.core.max_doc - self.deletions.len() as u32
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        assert!(
            doc < self.core.max_doc,
            "doc id {} out of range [0, {})",
            doc,
            self.core.max_doc
        );
        self.deletions.contains(doc)
    }

    fn has_deletions(&self) -> bool {
        !self.deletions.is_empty()
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        Ok(self
            .core
            .postings
            .get(term)
            .map_or(0, |p| p.docs.len() as u32))
    }

    fn postings(&self, term: &Term) -> Result<Box<dyn Postings + '_>> {
        Ok(Box::new(SegmentPostings {
            postings: self.core.postings.get(term),
            deletions: &self.deletions,
            index: None,
            position_cursor: 0,
        }))
    }

    fn terms(&self, field: &str) -> Result<Vec<Term>> {
        Ok(self
            .core
            .field_terms
            .get(field)
            .cloned()
            .unwrap_or_default())
    }

    fn sub_readers(&self) -> Option<&[Arc<dyn IndexReader>]> {
        None
    }

    fn core_key(&self) -> CoreKey {
        self.core.core_key.clone()
    }

    /// Segments are snapshots; new generations come from the owning index
    fn reopen(&self) -> Result<Option<Arc<dyn IndexReader>>> {
        Ok(None)
    }
}

/// Postings cursor over one segment's term
struct SegmentPostings<'a> {
    postings: Option<&'a TermPostings>,
    deletions: &'a RoaringBitmap,
    /// Index into `postings.docs`; `Some(len)` once exhausted
    index: Option<usize>,
    position_cursor: usize,
}

impl<'a> SegmentPostings<'a> {
    fn docs(&self) -> &'a [DocId] {
        self.postings.map_or(&[], |p| p.docs.as_slice())
    }

    /// Settle on the first live doc at or after `index`
    fn settle(&mut self, mut index: usize) -> DocId {
        let docs = self.docs();
        while index < docs.len() && self.deletions.contains(docs[index]) {
            index += 1;
        }
        let doc = docs.get(index).copied().unwrap_or(NO_MORE_DOCS);
        self.index = Some(index.min(docs.len()));
        self.position_cursor = 0;
        doc
    }
}

impl Postings for SegmentPostings<'_> {
    fn doc(&self) -> Option<DocId> {
        self.index
            .map(|i| self.docs().get(i).copied().unwrap_or(NO_MORE_DOCS))
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let next = match self.index {
            None => 0,
            Some(i) => (i + 1).min(self.docs().len()),
        };
        Ok(self.settle(next))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let from = match self.index {
            None => 0,
            Some(i) => {
                let docs = self.docs();
                if i < docs.len() && docs[i] >= target {
                    return Ok(docs[i]);
                }
                i
            }
        };
        // Skip ahead by binary search over the remaining docs
        let skip = self.docs()[from.min(self.docs().len())..].partition_point(|&d| d < target);
        Ok(self.settle(from + skip))
    }

    fn freq(&self) -> u32 {
        match (self.postings, self.index) {
            (Some(p), Some(i)) if i < p.docs.len() => p.positions_of(i).len() as u32,
            _ => 0,
        }
    }

    fn next_position(&mut self) -> Result<Position> {
        let (Some(postings), Some(index)) = (self.postings, self.index) else {
            panic!("next_position called on unpositioned postings");
        };
        let position = postings.positions_of(index)[self.position_cursor];
        self.position_cursor += 1;
        Ok(position)
    }
}

struct IndexState {
    generation: u64,
    segments: Vec<MemorySegment>,
    buffered: Vec<Document>,
    /// Composite for `generation`, built on first request
    current: Option<Arc<CompositeReader>>,
}

struct Shared {
    state: RwLock<IndexState>,
    this: Weak<Shared>,
}

impl GenerationSource for Shared {
    fn generation(&self) -> u64 {
        self.state.read().generation
    }

    fn open(&self) -> Arc<CompositeReader> {
        let mut state = self.state.write();
        if let Some(current) = &state.current {
            return Arc::clone(current);
        }
        let children: Vec<Arc<dyn IndexReader>> = state
            .segments
            .iter()
            .map(|s| Arc::new(s.clone()) as Arc<dyn IndexReader>)
            .collect();
        let source: Weak<dyn GenerationSource> = self.this.clone();
        let reader = Arc::new(CompositeReader::with_source(
            children,
            state.generation,
            source,
        ));
        tracing::debug!(
            generation = state.generation,
            segments = state.segments.len(),
            "opened memory index generation"
        );
        state.current = Some(Arc::clone(&reader));
        reader
    }
}

/// Thread-safe in-memory index
#[derive(Clone)]
pub struct MemoryIndex {
    shared: Arc<Shared>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        let shared = Arc::new_cyclic(|this| Shared {
            state: RwLock::new(IndexState {
                generation: 0,
                segments: Vec::new(),
                buffered: Vec::new(),
                current: None,
            }),
            this: this.clone(),
        });
        Self { shared }
    }

    /// Buffer a document. Returns the global doc id it gets once committed.
    pub fn add_document(&self, document: Document) -> DocId {
        let mut state = self.shared.state.write();
        let committed: u32 = state.segments.iter().map(|s| s.max_doc()).sum();
        let doc_id = committed + state.buffered.len() as DocId;
        state.buffered.push(document);
        doc_id
    }

    /// Seal buffered documents into a new segment. Returns whether anything
    /// was committed.
    pub fn commit(&self) -> bool {
        let mut state = self.shared.state.write();
        if state.buffered.is_empty() {
            return false;
        }
        let buffered = std::mem::take(&mut state.buffered);
        let segment = MemorySegment::from_documents(&buffered);
        tracing::debug!(docs = buffered.len(), core = ?segment.core_key(), "sealed segment");
        state.segments.push(segment);
        Self::advance_generation(&mut state);
        true
    }

    /// Delete a committed document by global id. Returns false if it was
    /// already deleted. Panics if the id is not committed.
    pub fn delete_document(&self, doc: DocId) -> bool {
        let mut state = self.shared.state.write();
        let mut base = 0;
        let mut target = None;
        for (i, segment) in state.segments.iter().enumerate() {
            if doc < base + segment.max_doc() {
                target = Some((i, doc - base));
                break;
            }
            base += segment.max_doc();
        }
        let Some((segment, local)) = target else {
            panic!("doc id {} out of range [0, {})", doc, base);
        };
        if state.segments[segment].is_deleted(local) {
            return false;
        }
        let updated = state.segments[segment].with_deletion(local);
        state.segments[segment] = updated;
        Self::advance_generation(&mut state);
        true
    }

    fn advance_generation(state: &mut IndexState) {
        state.generation += 1;
        state.current = None;
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation()
    }

    /// Reader over the current generation. Repeated calls without changes in
    /// between return the same reader.
    pub fn reader(&self) -> Arc<CompositeReader> {
        self.shared.open()
    }

    /// Segments of the current generation
    pub fn segments(&self) -> Vec<MemorySegment> {
        self.shared.state.read().segments.clone()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("MemoryIndex")
            .field("generation", &state.generation)
            .field("segments", &state.segments.len())
            .field("buffered", &state.buffered.len())
            .finish()
    }
}
