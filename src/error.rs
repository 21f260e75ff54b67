//! Error types for sieve.
//!
//! Engine I/O failures pass through unchanged. Programmer errors (doc ids out
//! of range, malformed slices) are not represented here: they panic.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for sieve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sieve
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying postings or segment access
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A predicate could not be evaluated while building a filtered view
    #[error("predicate evaluation failed: {reason}")]
    Predicate {
        /// What was being built
        reason: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Predicate bits are shorter than the segment they gate
    #[error("predicate covers {actual} docs but the segment has {expected}")]
    PredicateLength {
        /// Segment max doc
        expected: u32,
        /// Length reported by the bits
        actual: u32,
    },

    /// A cached computation failed in another thread
    #[error("shared computation failed: {0}")]
    Shared(Arc<Error>),

    /// A cached computation panicked before producing a value
    #[error("cached computation panicked")]
    ComputationPanicked,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a predicate failure with context
    pub fn predicate(reason: impl Into<String>, source: Error) -> Self {
        Error::Predicate {
            reason: reason.into(),
            source: Box::new(source),
        }
    }

    /// The failure behind any number of `Shared` layers
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// An equivalent error for other observers of the same failure. I/O and
    /// JSON errors keep their kind and message but not their source chain.
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::Predicate { reason, source } => Error::Predicate {
                reason: reason.clone(),
                source: Box::new(source.duplicate()),
            },
            Error::PredicateLength { expected, actual } => Error::PredicateLength {
                expected: *expected,
                actual: *actual,
            },
            Error::Shared(inner) => Error::Shared(Arc::clone(inner)),
            Error::ComputationPanicked => Error::ComputationPanicked,
            Error::Config(msg) => Error::Config(msg.clone()),
            Error::Json(e) => Error::Json(<serde_json::Error as serde::de::Error>::custom(e)),
        }
    }
}
