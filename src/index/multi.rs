//! Composite readers over ordered child segments.
//!
//! Children occupy consecutive, disjoint doc-id ranges, so merging their
//! postings needs no heap: walk the children in offset order and jump straight
//! to the owning child when advancing.

use crate::error::Result;
use crate::index::core_key::CoreKey;
use crate::index::reader::{IndexReader, Postings, SegmentOffsets};
use crate::index::types::*;
use std::fmt;
use std::sync::{Arc, Weak};

/// Something that can open the latest generation of a composite
pub trait GenerationSource: Send + Sync {
    fn generation(&self) -> u64;

    fn open(&self) -> Arc<CompositeReader>;
}

/// A reader over ordered child readers
pub struct CompositeReader {
    children: Vec<Arc<dyn IndexReader>>,
    offsets: SegmentOffsets,
    num_docs: u32,
    core_key: CoreKey,
    generation: u64,
    source: Option<Weak<dyn GenerationSource>>,
}

impl CompositeReader {
    /// Composite over fixed children; `reopen` never finds changes
    pub fn new(children: Vec<Arc<dyn IndexReader>>) -> Self {
        let offsets = SegmentOffsets::from_readers(&children);
        let num_docs = children.iter().map(|c| c.num_docs()).sum();
        Self {
            children,
            offsets,
            num_docs,
            core_key: CoreKey::new(),
            generation: 0,
            source: None,
        }
    }

    /// Composite for one generation of a reopenable source
    pub fn with_source(
        children: Vec<Arc<dyn IndexReader>>,
        generation: u64,
        source: Weak<dyn GenerationSource>,
    ) -> Self {
        let mut reader = Self::new(children);
        reader.generation = generation;
        reader.source = Some(source);
        reader
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn offsets(&self) -> &SegmentOffsets {
        &self.offsets
    }
}

impl fmt::Debug for CompositeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeReader")
            .field("core", &self.core_key)
            .field("generation", &self.generation)
            .field("segments", &self.children.len())
            .field("max_doc", &self.offsets.max_doc())
            .finish()
    }
}

impl IndexReader for CompositeReader {
    fn max_doc(&self) -> u32 {
        self.offsets.max_doc()
    }

    fn num_docs(&self) -> u32 {
        self.num_docs
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        let (segment, local) = self.offsets.locate(doc);
        self.children[segment].is_deleted(local)
    }

    fn has_deletions(&self) -> bool {
        self.children.iter().any(|c| c.has_deletions())
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for child in &self.children {
            total += child.doc_freq(term)?;
        }
        Ok(total)
    }

    fn postings(&self, term: &Term) -> Result<Box<dyn Postings + '_>> {
        Ok(Box::new(MultiPostings::new(
            &self.children,
            &self.offsets,
            term.clone(),
        )))
    }

    fn terms(&self, field: &str) -> Result<Vec<Term>> {
        let mut terms = Vec::new();
        for child in &self.children {
            terms.extend(child.terms(field)?);
        }
        terms.sort();
        terms.dedup();
        Ok(terms)
    }

    fn sub_readers(&self) -> Option<&[Arc<dyn IndexReader>]> {
        Some(&self.children)
    }

    fn core_key(&self) -> CoreKey {
        self.core_key.clone()
    }

    fn reopen(&self) -> Result<Option<Arc<dyn IndexReader>>> {
        let Some(source) = self.source.as_ref().and_then(Weak::upgrade) else {
            return Ok(None);
        };
        if source.generation() == self.generation {
            return Ok(None);
        }
        let reader: Arc<dyn IndexReader> = source.open();
        Ok(Some(reader))
    }
}

/// Postings of one term across children, in global doc-id order
pub struct MultiPostings<'a> {
    children: &'a [Arc<dyn IndexReader>],
    offsets: &'a SegmentOffsets,
    term: Term,
    /// Child whose postings are open (or will be opened next)
    segment: usize,
    current: Option<Box<dyn Postings + 'a>>,
    doc: Option<DocId>,
}

impl<'a> MultiPostings<'a> {
    pub fn new(
        children: &'a [Arc<dyn IndexReader>],
        offsets: &'a SegmentOffsets,
        term: Term,
    ) -> Self {
        Self {
            children,
            offsets,
            term,
            segment: 0,
            current: None,
            doc: None,
        }
    }

    fn exhaust(&mut self) -> DocId {
        self.segment = self.children.len();
        self.current = None;
        self.doc = Some(NO_MORE_DOCS);
        NO_MORE_DOCS
    }

    /// Open the current child's postings if needed; false past the last child
    fn open_current(&mut self) -> Result<bool> {
        if self.current.is_some() {
            return Ok(true);
        }
        if self.segment >= self.children.len() {
            return Ok(false);
        }
        self.current = Some(self.children[self.segment].postings(&self.term)?);
        Ok(true)
    }
}

impl Postings for MultiPostings<'_> {
    fn doc(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        while self.open_current()? {
            let Some(current) = self.current.as_mut() else {
                break;
            };
            let local = current.next_doc()?;
            if local != NO_MORE_DOCS {
                let doc = self.offsets.start(self.segment) + local;
                self.doc = Some(doc);
                return Ok(doc);
            }
            self.current = None;
            self.segment += 1;
        }
        Ok(self.exhaust())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if let Some(doc) = self.doc {
            if doc >= target {
                return Ok(doc);
            }
        }
        if target >= self.offsets.max_doc() {
            return Ok(self.exhaust());
        }

        let target_segment = self.offsets.segment_of(target);
        if target_segment > self.segment {
            self.segment = target_segment;
            self.current = None;
        }

        while self.open_current()? {
            let base = self.offsets.start(self.segment);
            let Some(current) = self.current.as_mut() else {
                break;
            };
            let local = current.advance(target.saturating_sub(base))?;
            if local != NO_MORE_DOCS {
                let doc = base + local;
                self.doc = Some(doc);
                return Ok(doc);
            }
            self.current = None;
            self.segment += 1;
        }
        Ok(self.exhaust())
    }

    fn freq(&self) -> u32 {
        self.current.as_ref().map_or(0, |c| c.freq())
    }

    fn next_position(&mut self) -> Result<Position> {
        match self.current.as_mut() {
            Some(current) => current.next_position(),
            None => panic!("next_position called on unpositioned postings"),
        }
    }
}
