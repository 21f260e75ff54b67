//! Per-document boolean conditions.
//!
//! A [`BitsProvider`] produces [`Bits`] for one reader: a function from the
//! reader's doc ids to bool. Providers carry a [`CacheKey`] so filtered views
//! built from equal providers share identity.

pub mod docset;

pub use docset::{FilterBitsProvider, PrePredicateFilter, PredicateDocIdSet, PredicateFilter};

use crate::error::Result;
use crate::index::{CacheKey, DocId, IndexReader};
use std::fmt;
use std::sync::Arc;

/// Random-access booleans over doc ids
pub trait Bits: Send + Sync {
    fn get(&self, index: u32) -> bool;

    /// Number of valid indices; `None` for an unbounded function
    fn len(&self) -> Option<u32>;
}

/// Produces the bits of a predicate for a reader
pub trait BitsProvider: Send + Sync + fmt::Debug {
    fn get(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>>;

    /// Identity of the predicate. Providers without a structural description
    /// must hand out a key no other provider uses ([`CacheKey::unique`]).
    fn cache_key(&self) -> CacheKey;
}

/// How a clause takes part in a boolean combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::Should => "",
            Occur::MustNot => "-",
        }
    }
}

/// A value with its occurrence
#[derive(Debug, Clone)]
pub struct Clause<T> {
    pub value: T,
    pub occur: Occur,
}

impl<T> Clause<T> {
    pub fn new(value: T, occur: Occur) -> Self {
        Self { value, occur }
    }

    pub fn must(value: T) -> Self {
        Self::new(value, Occur::Must)
    }

    pub fn should(value: T) -> Self {
        Self::new(value, Occur::Should)
    }

    pub fn must_not(value: T) -> Self {
        Self::new(value, Occur::MustNot)
    }
}

/// Structural key of a clause list, e.g. `bool(+a,-b,c)`
pub(crate) fn clauses_key<'a>(
    kind: &str,
    clauses: impl IntoIterator<Item = (Occur, &'a CacheKey)>,
) -> CacheKey {
    let parts: Vec<String> = clauses
        .into_iter()
        .map(|(occur, key)| format!("{}{}", occur.prefix(), key))
        .collect();
    CacheKey::structural(format!("{}({})", kind, parts.join(",")))
}

/// Bits combined by occurrence.
///
/// A doc passes when every MUST passes, no MUST_NOT passes, and at least one
/// SHOULD passes. With no SHOULD clauses the last condition is vacuous, so an
/// empty predicate passes every doc.
pub struct BooleanPredicate {
    must: Vec<Arc<dyn Bits>>,
    should: Vec<Arc<dyn Bits>>,
    must_not: Vec<Arc<dyn Bits>>,
}

impl BooleanPredicate {
    pub fn new(clauses: Vec<Clause<Arc<dyn Bits>>>) -> Self {
        let mut predicate = Self {
            must: Vec::new(),
            should: Vec::new(),
            must_not: Vec::new(),
        };
        for clause in clauses {
            match clause.occur {
                Occur::Must => predicate.must.push(clause.value),
                Occur::Should => predicate.should.push(clause.value),
                Occur::MustNot => predicate.must_not.push(clause.value),
            }
        }
        predicate
    }
}

impl Bits for BooleanPredicate {
    fn get(&self, index: u32) -> bool {
        self.must.iter().all(|b| b.get(index))
            && !self.must_not.iter().any(|b| b.get(index))
            && (self.should.is_empty() || self.should.iter().any(|b| b.get(index)))
    }

    fn len(&self) -> Option<u32> {
        None
    }
}

/// Builds a [`BooleanPredicate`] per reader from its clauses' providers
pub struct BooleanBitsProvider {
    clauses: Vec<Clause<Arc<dyn BitsProvider>>>,
    key: CacheKey,
}

impl BooleanBitsProvider {
    pub fn new(clauses: Vec<Clause<Arc<dyn BitsProvider>>>) -> Self {
        let keys: Vec<(Occur, CacheKey)> = clauses
            .iter()
            .map(|c| (c.occur, c.value.cache_key()))
            .collect();
        let key = clauses_key("bool", keys.iter().map(|(occur, key)| (*occur, key)));
        Self { clauses, key }
    }

    pub fn builder() -> BooleanBitsProviderBuilder {
        BooleanBitsProviderBuilder::default()
    }

    pub fn clauses(&self) -> &[Clause<Arc<dyn BitsProvider>>] {
        &self.clauses
    }
}

impl fmt::Debug for BooleanBitsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BooleanBitsProvider({})", self.key)
    }
}

impl BitsProvider for BooleanBitsProvider {
    fn get(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> {
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            clauses.push(Clause::new(clause.value.get(reader)?, clause.occur));
        }
        Ok(Arc::new(BooleanPredicate::new(clauses)))
    }

    fn cache_key(&self) -> CacheKey {
        self.key.clone()
    }
}

/// Accumulates clauses; `None` arguments are skipped
#[derive(Default)]
pub struct BooleanBitsProviderBuilder {
    clauses: Vec<Clause<Arc<dyn BitsProvider>>>,
}

impl BooleanBitsProviderBuilder {
    fn push(mut self, provider: Option<Arc<dyn BitsProvider>>, occur: Occur) -> Self {
        if let Some(provider) = provider {
            self.clauses.push(Clause::new(provider, occur));
        }
        self
    }

    pub fn must(self, provider: impl Into<Option<Arc<dyn BitsProvider>>>) -> Self {
        self.push(provider.into(), Occur::Must)
    }

    pub fn should(self, provider: impl Into<Option<Arc<dyn BitsProvider>>>) -> Self {
        self.push(provider.into(), Occur::Should)
    }

    pub fn must_not(self, provider: impl Into<Option<Arc<dyn BitsProvider>>>) -> Self {
        self.push(provider.into(), Occur::MustNot)
    }

    pub fn build(self) -> BooleanBitsProvider {
        BooleanBitsProvider::new(self.clauses)
    }
}

/// Bits with a constant value
#[derive(Debug, Clone, Copy)]
pub struct ConstantBits {
    value: bool,
    len: Option<u32>,
}

impl ConstantBits {
    pub fn all(len: Option<u32>) -> Self {
        Self { value: true, len }
    }

    pub fn none(len: Option<u32>) -> Self {
        Self { value: false, len }
    }
}

impl Bits for ConstantBits {
    fn get(&self, _index: u32) -> bool {
        self.value
    }

    fn len(&self) -> Option<u32> {
        self.len
    }
}

/// Negation of other bits; the length is kept
pub struct InverseBits {
    inner: Arc<dyn Bits>,
}

impl InverseBits {
    pub fn new(inner: Arc<dyn Bits>) -> Self {
        Self { inner }
    }
}

impl Bits for InverseBits {
    fn get(&self, index: u32) -> bool {
        !self.inner.get(index)
    }

    fn len(&self) -> Option<u32> {
        self.inner.len()
    }
}

/// Bits computed by a closure over doc ids
pub struct FnBits<F> {
    f: Arc<F>,
}

impl<F: Fn(DocId) -> bool + Send + Sync> Bits for FnBits<F> {
    fn get(&self, index: u32) -> bool {
        (self.f)(index)
    }

    fn len(&self) -> Option<u32> {
        None
    }
}

#[derive(Debug)]
struct ConstantProvider {
    value: bool,
}

impl BitsProvider for ConstantProvider {
    fn get(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> {
        let len = Some(reader.max_doc());
        Ok(Arc::new(if self.value {
            ConstantBits::all(len)
        } else {
            ConstantBits::none(len)
        }))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::structural(if self.value { "all" } else { "none" })
    }
}

#[derive(Debug)]
struct InverseProvider {
    inner: Arc<dyn BitsProvider>,
}

impl BitsProvider for InverseProvider {
    fn get(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> {
        Ok(Arc::new(InverseBits::new(self.inner.get(reader)?)))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::compose("not", [&self.inner.cache_key()])
    }
}

type ReaderFn = dyn Fn(&Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> + Send + Sync;

struct ReaderFnProvider {
    key: CacheKey,
    f: Box<ReaderFn>,
}

impl fmt::Debug for ReaderFnProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReaderFnProvider({})", self.key)
    }
}

impl BitsProvider for ReaderFnProvider {
    fn get(&self, reader: &Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> {
        (self.f)(reader)
    }

    fn cache_key(&self) -> CacheKey {
        self.key.clone()
    }
}

/// Constructors for common providers
pub struct Predicates;

impl Predicates {
    /// Every provider must pass. A single provider is returned as is.
    pub fn and(
        providers: impl IntoIterator<Item = Arc<dyn BitsProvider>>,
    ) -> Arc<dyn BitsProvider> {
        Self::combine(providers, Occur::Must)
    }

    /// At least one provider must pass. A single provider is returned as is;
    /// with none at all the result passes every doc.
    pub fn or(
        providers: impl IntoIterator<Item = Arc<dyn BitsProvider>>,
    ) -> Arc<dyn BitsProvider> {
        Self::combine(providers, Occur::Should)
    }

    fn combine(
        providers: impl IntoIterator<Item = Arc<dyn BitsProvider>>,
        occur: Occur,
    ) -> Arc<dyn BitsProvider> {
        let mut providers: Vec<_> = providers.into_iter().collect();
        if providers.len() == 1 {
            if let Some(only) = providers.pop() {
                return only;
            }
        }
        let clauses = providers
            .into_iter()
            .map(|p| Clause::new(p, occur))
            .collect();
        Arc::new(BooleanBitsProvider::new(clauses))
    }

    pub fn not(provider: Arc<dyn BitsProvider>) -> Arc<dyn BitsProvider> {
        Arc::new(InverseProvider { inner: provider })
    }

    pub fn all() -> Arc<dyn BitsProvider> {
        Arc::new(ConstantProvider { value: true })
    }

    pub fn none() -> Arc<dyn BitsProvider> {
        Arc::new(ConstantProvider { value: false })
    }

    /// Predicate over a reader's local doc ids
    pub fn from_fn<F>(key: CacheKey, f: F) -> Arc<dyn BitsProvider>
    where
        F: Fn(DocId) -> bool + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::per_reader(key, move |_| {
            let bits: Arc<dyn Bits> = Arc::new(FnBits { f: Arc::clone(&f) });
            Ok(bits)
        })
    }

    /// Predicate whose bits are built per reader, possibly failing
    pub fn per_reader<F>(key: CacheKey, f: F) -> Arc<dyn BitsProvider>
    where
        F: Fn(&Arc<dyn IndexReader>) -> Result<Arc<dyn Bits>> + Send + Sync + 'static,
    {
        Arc::new(ReaderFnProvider {
            key,
            f: Box::new(f),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docset::FixedBitSet;
    use crate::index::{Document, MemoryIndex};

    fn bits(len: u32, docs: &[u32]) -> Arc<dyn Bits> {
        Arc::new(FixedBitSet::from_docs(len, docs.iter().copied()))
    }

    fn reader(docs: usize) -> Arc<dyn IndexReader> {
        let index = MemoryIndex::new();
        for _ in 0..docs {
            index.add_document(Document::new().text("f", "x"));
        }
        index.commit();
        index.reader()
    }

    #[test]
    fn test_boolean_predicate_occurs() {
        let predicate = BooleanPredicate::new(vec![
            Clause::must(bits(6, &[0, 1, 2, 3, 4])),
            Clause::must_not(bits(6, &[1])),
            Clause::should(bits(6, &[2, 5])),
            Clause::should(bits(6, &[0])),
        ]);
        let passing: Vec<u32> = (0..6).filter(|&i| predicate.get(i)).collect();
        assert_eq!(passing, vec![0, 2]);
        assert_eq!(predicate.len(), None);
    }

    #[test]
    fn test_empty_boolean_predicate_passes_everything() {
        let predicate = BooleanPredicate::new(Vec::new());
        assert!(predicate.get(0));
        assert!(predicate.get(1000));

        let only_must_not = BooleanPredicate::new(vec![Clause::must_not(bits(3, &[1]))]);
        assert!(only_must_not.get(0));
        assert!(!only_must_not.get(1));
    }

    #[test]
    fn test_predicates_and_or_not() {
        let reader = reader(4);
        let even = Predicates::from_fn(CacheKey::structural("even"), |d| d % 2 == 0);
        let small = Predicates::from_fn(CacheKey::structural("small"), |d| d < 3);

        let and = Predicates::and([Arc::clone(&even), Arc::clone(&small)]).get(&reader).unwrap();
        assert_eq!((0..4).filter(|&d| and.get(d)).collect::<Vec<_>>(), vec![0, 2]);

        let or = Predicates::or([Arc::clone(&even), Arc::clone(&small)]).get(&reader).unwrap();
        assert_eq!((0..4).filter(|&d| or.get(d)).collect::<Vec<_>>(), vec![0, 1, 2]);

        let not = Predicates::not(Arc::clone(&even)).get(&reader).unwrap();
        assert_eq!((0..4).filter(|&d| not.get(d)).collect::<Vec<_>>(), vec![1, 3]);

        let single = Predicates::and([Arc::clone(&even)]);
        assert!(Arc::ptr_eq(&single, &even));
    }

    #[test]
    fn test_inverse_keeps_length() {
        let inverse = InverseBits::new(bits(7, &[3]));
        assert_eq!(inverse.len(), Some(7));
        assert!(!inverse.get(3));
        assert!(inverse.get(4));
    }

    #[test]
    fn test_constant_providers() {
        let reader = reader(3);
        let all = Predicates::all().get(&reader).unwrap();
        let none = Predicates::none().get(&reader).unwrap();
        assert_eq!(all.len(), Some(3));
        assert!(all.get(2));
        assert!(!none.get(0));
        assert_eq!(Predicates::all().cache_key(), Predicates::all().cache_key());
    }

    #[test]
    fn test_builder_keys_are_structural() {
        let a = Predicates::from_fn(CacheKey::structural("a"), |_| true);
        let b = Predicates::from_fn(CacheKey::structural("b"), |_| false);
        let first = BooleanBitsProvider::builder()
            .must(Arc::clone(&a))
            .must_not(Arc::clone(&b))
            .should(None::<Arc<dyn BitsProvider>>)
            .build();
        let second = BooleanBitsProvider::builder().must(a).must_not(b).build();
        assert_eq!(first.cache_key(), second.cache_key());
        assert_eq!(first.cache_key().to_string(), "bool(+a,-b)");
        assert_eq!(first.clauses().len(), 2);
    }
}
