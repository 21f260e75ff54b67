//! Candidate lists for phrase matching, narrowed in place.
//!
//! Positions are normalized: a term at phrase offset `k` found at position `p`
//! contributes `p - k`. A doc matches the phrase when some normalized position
//! survives every term.

use crate::error::Result;
use crate::index::{DocId, NO_MORE_DOCS, Postings};

/// Normalized positions of one candidate doc, strictly increasing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionList {
    positions: Vec<i64>,
}

impl PositionList {
    /// Read the current doc's positions from `postings`, normalized by `offset`
    pub fn read(postings: &mut dyn Postings, offset: i64) -> Result<Self> {
        let freq = postings.freq() as usize;
        let mut positions = Vec::with_capacity(freq);
        for _ in 0..freq {
            positions.push(postings.next_position()? as i64 - offset);
        }
        Ok(Self { positions })
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Keep only positions the current doc of `postings` also has at
    /// `offset`. Returns whether any survive.
    ///
    /// Sorted merge; survivors are compacted to the front of the buffer.
    pub fn intersect(&mut self, postings: &mut dyn Postings, offset: i64) -> Result<bool> {
        let other_count = postings.freq();
        let mut read = 0;
        let mut write = 0;
        let mut consumed = 0;

        while read < self.positions.len() && consumed < other_count {
            let other = postings.next_position()? as i64 - offset;
            consumed += 1;
            while read < self.positions.len() && self.positions[read] < other {
                read += 1;
            }
            if read < self.positions.len() && self.positions[read] == other {
                self.positions[write] = other;
                write += 1;
                read += 1;
            }
        }

        self.positions.truncate(write);
        Ok(write != 0)
    }
}

/// Candidate docs of one leaf with their surviving positions
#[derive(Debug, Clone, Default)]
pub struct MatchList {
    docs: Vec<DocId>,
    positions: Vec<PositionList>,
}

impl MatchList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            docs: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
        }
    }

    /// Append a candidate; docs must be added in increasing order
    pub fn push(&mut self, doc: DocId, positions: PositionList) {
        debug_assert!(self.docs.last().is_none_or(|&last| last < doc));
        self.docs.push(doc);
        self.positions.push(positions);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn docs(&self) -> &[DocId] {
        &self.docs
    }

    pub fn positions(&self, index: usize) -> &PositionList {
        &self.positions[index]
    }

    pub fn into_docs(self) -> Vec<DocId> {
        self.docs
    }

    /// Keep only candidates where the term behind `postings` continues the
    /// phrase at `offset`.
    ///
    /// Candidates are visited in order and `postings` is advanced straight
    /// to each one, so postings between candidates are skipped rather than
    /// scanned. Survivors are compacted to the front of both buffers.
    pub fn intersect(&mut self, postings: &mut dyn Postings, offset: i64) -> Result<()> {
        let mut write = 0;
        for read in 0..self.docs.len() {
            let doc = self.docs[read];
            let current = postings.advance(doc)?;
            if current == NO_MORE_DOCS {
                break;
            }
            if current != doc {
                continue;
            }
            if self.positions[read].intersect(postings, offset)? {
                self.docs.swap(write, read);
                self.positions.swap(write, read);
                write += 1;
            }
        }
        self.docs.truncate(write);
        self.positions.truncate(write);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, IndexReader, MemorySegment, Term};

    fn segment(texts: &[&str]) -> MemorySegment {
        let docs: Vec<Document> = texts.iter().map(|t| Document::new().text("f", t)).collect();
        MemorySegment::from_documents(&docs)
    }

    fn first_term(segment: &MemorySegment, text: &str, offset: i64) -> MatchList {
        let mut postings = segment.postings(&Term::new("f", text)).unwrap();
        let mut matches = MatchList::default();
        while postings.next_doc().unwrap() != NO_MORE_DOCS {
            let doc = postings.doc().unwrap();
            matches.push(doc, PositionList::read(postings.as_mut(), offset).unwrap());
        }
        matches
    }

    #[test]
    fn test_position_list_merge() {
        let segment = segment(&["a b a b a"]);
        let mut list = PositionList {
            positions: vec![-1, 0, 2, 4],
        };
        let mut postings = segment.postings(&Term::new("f", "b")).unwrap();
        postings.next_doc().unwrap();
        // b at 1 and 3, offset 1 -> normalized 0 and 2
        assert!(list.intersect(postings.as_mut(), 1).unwrap());
        assert_eq!(list.as_slice(), &[0, 2]);
    }

    #[test]
    fn test_position_list_no_overlap() {
        let segment = segment(&["x y"]);
        let mut list = PositionList { positions: vec![5] };
        let mut postings = segment.postings(&Term::new("f", "y")).unwrap();
        postings.next_doc().unwrap();
        assert!(!list.intersect(postings.as_mut(), 0).unwrap());
        assert!(list.is_empty());
    }

    #[test]
    fn test_match_list_compacts_in_place() {
        let segment = segment(&["hello world", "world hello", "hello there world", "hello world again"]);
        let mut matches = first_term(&segment, "hello", 0);
        assert_eq!(matches.docs(), &[0, 1, 2, 3]);

        let capacity = matches.docs.capacity();
        let mut postings = segment.postings(&Term::new("f", "world")).unwrap();
        matches.intersect(postings.as_mut(), 1).unwrap();
        assert_eq!(matches.docs(), &[0, 3]);
        assert_eq!(matches.positions(1).as_slice(), &[0]);
        assert_eq!(matches.docs.capacity(), capacity);
    }

    #[test]
    fn test_match_list_postings_exhausted_early() {
        let segment = segment(&["a b", "a", "a"]);
        let mut matches = first_term(&segment, "a", 0);
        let mut postings = segment.postings(&Term::new("f", "b")).unwrap();
        matches.intersect(postings.as_mut(), 1).unwrap();
        assert_eq!(matches.docs(), &[0]);
    }

    #[test]
    fn test_negative_normalized_positions() {
        let segment = segment(&["b c"]);
        // "c" at offset 2 of a phrase: position 1 normalizes to -1
        let matches = first_term(&segment, "c", 2);
        assert_eq!(matches.positions(0).as_slice(), &[-1]);
    }
}
