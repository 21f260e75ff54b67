//! # sieve - doc-set algebra and phrase matching beneath an inverted index
//!
//! sieve sits between an inverted index and the query layer above it. It
//! provides:
//!
//! - [`docset`] - dense and sparse doc sets and their boolean algebra
//! - [`filter`] - filters from readers to doc sets, and their combinators
//! - [`predicate`] - per-document conditions ([`predicate::BitsProvider`])
//! - [`phrase`] - exact phrase matching over term positions
//! - [`filtered`] - reader views narrowed by a predicate, with stable identity
//! - [`cache`] - a concurrent doc-set cache computing each entry at most once
//! - [`index`] - the read contract the above work against, and an in-memory
//!   engine implementing it
//!
//! ## Quick Start
//!
//! ```
//! use sieve::docset::collect;
//! use sieve::index::{Document, IndexReader, MemoryIndex};
//! use sieve::phrase::PhraseFilter;
//! use std::sync::Arc;
//!
//! let index = MemoryIndex::new();
//! index.add_document(Document::new().text("body", "i love to say hello world"));
//! index.add_document(Document::new().text("body", "world hello"));
//! index.commit();
//!
//! let reader: Arc<dyn IndexReader> = index.reader();
//! let matches = PhraseFilter::new("body", &["hello", "world"])
//!     .matches(&reader)
//!     .unwrap();
//! assert_eq!(collect(matches.as_ref()), vec![0]);
//! ```
//!
//! ## Identity and caching
//!
//! Every reader generation carries a [`index::CoreKey`]. Caches key entries on
//! it and drop them when the last handle to the generation goes away, so a
//! cached doc set never outlives the generation it was computed for.

pub mod cache;
pub mod config;
pub mod docset;
pub mod error;
pub mod filter;
pub mod filtered;
pub mod index;
pub mod phrase;
pub mod predicate;
pub mod utils;

pub use error::{Error, Result};
