//! The engine beneath the doc-set algebra: the read contract, generation
//! identity, and an in-memory reference implementation.

pub mod core_key;
pub mod memory;
pub mod multi;
pub mod reader;
pub mod types;

pub use core_key::{CoreId, CoreKey, WeakCoreKey};
pub use memory::{Document, MemoryIndex, MemorySegment};
pub use multi::{CompositeReader, GenerationSource, MultiPostings};
pub use reader::{
    IndexReader, LeafContext, Postings, ReaderAndOffset, SegmentOffsets, gather_leaves,
    reader_and_offset,
};
pub use types::*;
