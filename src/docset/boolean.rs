//! Lazy boolean combination of doc sets.
//!
//! The candidate driver is the conjunction of MUST clauses if there are any,
//! else the disjunction of SHOULD clauses, else every doc. A candidate
//! survives when every MUST contains it, at least one SHOULD contains it (if
//! there are SHOULD clauses), and no MUST_NOT contains it. Membership checks
//! only ever advance the clause iterators, since candidates increase.

use super::{AllDocsIterator, DocIdSet, DocIterator};
use crate::index::{DocId, NO_MORE_DOCS};
use crate::predicate::{Clause, Occur};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Doc sets combined by occurrence
#[derive(Debug)]
pub struct BooleanDocSet {
    clauses: Vec<Clause<Arc<dyn DocIdSet>>>,
    /// Universe for the all-docs driver; only needed without MUST or SHOULD
    max_doc: Option<u32>,
}

impl BooleanDocSet {
    pub fn new(clauses: Vec<Clause<Arc<dyn DocIdSet>>>, max_doc: u32) -> Self {
        Self {
            clauses,
            max_doc: Some(max_doc),
        }
    }

    /// Combination that always has a MUST or SHOULD clause to drive it
    fn driven(clauses: Vec<Clause<Arc<dyn DocIdSet>>>) -> Self {
        debug_assert!(clauses.iter().any(|c| c.occur != Occur::MustNot));
        Self {
            clauses,
            max_doc: None,
        }
    }

    pub fn clauses(&self) -> &[Clause<Arc<dyn DocIdSet>>] {
        &self.clauses
    }

    fn iterators(&self, occur: Occur) -> Vec<Box<dyn DocIterator>> {
        self.clauses
            .iter()
            .filter(|c| c.occur == occur)
            .map(|c| c.value.iterator())
            .collect()
    }
}

impl DocIdSet for BooleanDocSet {
    fn iterator(&self) -> Box<dyn DocIterator> {
        let must = self.iterators(Occur::Must);
        let should = self.iterators(Occur::Should);
        let must_not = self.iterators(Occur::MustNot);

        let (driver, should): (Box<dyn DocIterator>, _) = if !must.is_empty() {
            (Box::new(ConjunctionIterator::new(must)), should)
        } else if !should.is_empty() {
            // The driver already guarantees a SHOULD match
            (Box::new(DisjunctionIterator::new(should)), Vec::new())
        } else {
            (
                Box::new(AllDocsIterator::new(self.max_doc.unwrap_or(0))),
                Vec::new(),
            )
        };

        Box::new(BooleanIterator {
            driver,
            should,
            must_not,
        })
    }

    fn is_cacheable(&self) -> bool {
        false
    }
}

struct BooleanIterator {
    driver: Box<dyn DocIterator>,
    should: Vec<Box<dyn DocIterator>>,
    must_not: Vec<Box<dyn DocIterator>>,
}

impl BooleanIterator {
    fn accepts(&mut self, doc: DocId) -> bool {
        if self.must_not.iter_mut().any(|it| it.advance(doc) == doc) {
            return false;
        }
        if self.should.is_empty() {
            return true;
        }
        // No short-circuit: every SHOULD iterator keeps pace with the driver
        let mut matched = false;
        for it in &mut self.should {
            matched |= it.advance(doc) == doc;
        }
        matched
    }

    fn settle(&mut self, mut doc: DocId) -> DocId {
        while doc != NO_MORE_DOCS && !self.accepts(doc) {
            doc = self.driver.next_doc();
        }
        doc
    }
}

impl DocIterator for BooleanIterator {
    fn doc(&self) -> Option<DocId> {
        self.driver.doc()
    }

    fn next_doc(&mut self) -> DocId {
        let doc = self.driver.next_doc();
        self.settle(doc)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        if let Some(doc) = self.driver.doc() {
            if doc >= target {
                return doc;
            }
        }
        let doc = self.driver.advance(target);
        self.settle(doc)
    }

    fn cost(&self) -> u64 {
        self.driver.cost()
    }
}

/// Leapfrog intersection
struct ConjunctionIterator {
    iterators: Vec<Box<dyn DocIterator>>,
    doc: Option<DocId>,
}

impl ConjunctionIterator {
    fn new(mut iterators: Vec<Box<dyn DocIterator>>) -> Self {
        // Cheapest first: it proposes the candidates
        iterators.sort_by_key(|it| it.cost());
        Self {
            iterators,
            doc: None,
        }
    }

    /// Align every iterator on the first common doc `>= candidate`
    fn align(&mut self, mut candidate: DocId) -> DocId {
        'outer: while candidate != NO_MORE_DOCS {
            for it in &mut self.iterators {
                let doc = it.advance(candidate);
                if doc != candidate {
                    candidate = doc;
                    continue 'outer;
                }
            }
            break;
        }
        self.doc = Some(candidate);
        candidate
    }
}

impl DocIterator for ConjunctionIterator {
    fn doc(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> DocId {
        let candidate = match self.doc {
            Some(NO_MORE_DOCS) => return NO_MORE_DOCS,
            _ => self.iterators[0].next_doc(),
        };
        self.align(candidate)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        match self.doc {
            Some(doc) if doc >= target => doc,
            _ => {
                let candidate = self.iterators[0].advance(target);
                self.align(candidate)
            }
        }
    }

    fn cost(&self) -> u64 {
        self.iterators.iter().map(|it| it.cost()).min().unwrap_or(0)
    }
}

/// Union over a min-heap of (current doc, iterator index)
struct DisjunctionIterator {
    iterators: Vec<Box<dyn DocIterator>>,
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    doc: Option<DocId>,
}

impl DisjunctionIterator {
    fn new(iterators: Vec<Box<dyn DocIterator>>) -> Self {
        Self {
            iterators,
            heap: BinaryHeap::new(),
            doc: None,
        }
    }

    /// Position every iterator at or after `target` and fill the heap
    fn start(&mut self, target: DocId) -> DocId {
        for (i, it) in self.iterators.iter_mut().enumerate() {
            let doc = it.advance(target);
            if doc != NO_MORE_DOCS {
                self.heap.push(Reverse((doc, i)));
            }
        }
        self.top()
    }

    fn top(&mut self) -> DocId {
        let doc = self
            .heap
            .peek()
            .map_or(NO_MORE_DOCS, |Reverse((doc, _))| *doc);
        self.doc = Some(doc);
        doc
    }

    /// Move every iterator sitting below `target` forward
    fn pop_below(&mut self, target: DocId) {
        while let Some(&Reverse((doc, i))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            let next = self.iterators[i].advance(target);
            if next != NO_MORE_DOCS {
                self.heap.push(Reverse((next, i)));
            }
        }
    }
}

impl DocIterator for DisjunctionIterator {
    fn doc(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> DocId {
        match self.doc {
            None => self.start(0),
            Some(NO_MORE_DOCS) => NO_MORE_DOCS,
            Some(doc) => {
                self.pop_below(doc + 1);
                self.top()
            }
        }
    }

    fn advance(&mut self, target: DocId) -> DocId {
        match self.doc {
            Some(doc) if doc >= target => doc,
            None => self.start(target),
            Some(_) => {
                self.pop_below(target);
                self.top()
            }
        }
    }

    fn cost(&self) -> u64 {
        self.iterators.iter().map(|it| it.cost()).sum()
    }
}

fn combine(
    sets: impl IntoIterator<Item = Option<Arc<dyn DocIdSet>>>,
    occur: Occur,
) -> Option<Arc<dyn DocIdSet>> {
    let mut sets: Vec<Arc<dyn DocIdSet>> = sets.into_iter().flatten().collect();
    match sets.len() {
        0 => None,
        1 => sets.pop(),
        _ => {
            let clauses = sets
                .into_iter()
                .map(|set| Clause::new(set, occur))
                .collect();
            Some(Arc::new(BooleanDocSet::driven(clauses)))
        }
    }
}

/// Intersection. `None` inputs impose no constraint; no inputs give `None`,
/// a single input is returned as is.
pub fn and(sets: impl IntoIterator<Item = Option<Arc<dyn DocIdSet>>>) -> Option<Arc<dyn DocIdSet>> {
    combine(sets, Occur::Must)
}

/// Union, with the same `None` handling as [`and`]
pub fn or(sets: impl IntoIterator<Item = Option<Arc<dyn DocIdSet>>>) -> Option<Arc<dyn DocIdSet>> {
    combine(sets, Occur::Should)
}

/// Complement within `0..max_doc`. Always wraps; `None` complements to every
/// doc.
pub fn not(set: Option<Arc<dyn DocIdSet>>, max_doc: u32) -> Arc<dyn DocIdSet> {
    let clauses = set
        .map(|set| Clause::new(set, Occur::MustNot))
        .into_iter()
        .collect();
    Arc::new(BooleanDocSet::new(clauses, max_doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docset::{AllDocSet, FixedBitSet, SortedDocSet, collect};

    fn sorted(docs: &[DocId]) -> Option<Arc<dyn DocIdSet>> {
        Some(Arc::new(SortedDocSet::new(docs.to_vec())))
    }

    #[test]
    fn test_and_null_handling() {
        assert!(and([None, None]).is_none());
        let a = sorted(&[1, 2]);
        let only = and([None, a.clone(), None]).unwrap();
        assert!(Arc::ptr_eq(&only, a.as_ref().unwrap()));
    }

    #[test]
    fn test_or_of_nulls_is_none() {
        assert!(or(Vec::new()).is_none());
        assert!(or([None]).is_none());
    }

    #[test]
    fn test_and_intersects() {
        let set = and([sorted(&[1, 3, 5, 7, 9]), sorted(&[3, 4, 5, 9, 10]), sorted(&[0, 5, 9])]).unwrap();
        assert!(!set.is_cacheable());
        assert_eq!(collect(set.as_ref()), vec![5, 9]);

        let mut iter = set.iterator();
        assert_eq!(iter.advance(6), 9);
        assert_eq!(iter.advance(6), 9);
        assert_eq!(iter.next_doc(), NO_MORE_DOCS);
    }

    #[test]
    fn test_or_unions() {
        let dense: Option<Arc<dyn DocIdSet>> = Some(Arc::new(FixedBitSet::from_docs(20, [2, 8])));
        let set = or([sorted(&[1, 8, 15]), dense, sorted(&[])]).unwrap();
        assert_eq!(collect(set.as_ref()), vec![1, 2, 8, 15]);

        let mut iter = set.iterator();
        assert_eq!(iter.advance(3), 8);
        assert_eq!(iter.next_doc(), 15);
    }

    #[test]
    fn test_not_complements() {
        let set = not(sorted(&[0, 2]), 5);
        assert_eq!(collect(set.as_ref()), vec![1, 3, 4]);
        assert_eq!(collect(not(None, 3).as_ref()), vec![0, 1, 2]);
    }

    #[test]
    fn test_mixed_clauses() {
        let clauses = vec![
            Clause::new(Arc::new(AllDocSet::new(10)) as Arc<dyn DocIdSet>, Occur::Must),
            Clause::new(Arc::new(SortedDocSet::new(vec![1, 2, 3, 7])) as _, Occur::Should),
            Clause::new(Arc::new(SortedDocSet::new(vec![5, 6, 7])) as _, Occur::Should),
            Clause::new(Arc::new(SortedDocSet::new(vec![2, 6])) as _, Occur::MustNot),
        ];
        let set = BooleanDocSet::new(clauses, 10);
        assert_eq!(collect(&set), vec![1, 3, 5, 7]);
    }
}
