//! Text helpers shared by the CLI, tests and benches.
//!
//! - [`tokenizer`] - lowercase word tokens with positions, line splitting

pub mod tokenizer;

pub use tokenizer::*;
