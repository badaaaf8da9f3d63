//! Snippet highlighting: groups term matches into fragments, ranks them,
//! and renders each with surrounding context as a list of borrowed byte
//! spans so no part of the source document is copied.
//!
//! This crate only walks a pre-computed, position-aligned match sequence
//! (from an index's byte-offset and term-offset iterators); it does not
//! itself tokenize text.

mod context;
mod fragment;
mod render;

pub use context::Delimiters;
pub use fragment::{FragmentList, LockstepEvent, OrderMode, TermMatch};
pub use render::{highlight_fragments, highlight_whole_doc, Span, Tags};
