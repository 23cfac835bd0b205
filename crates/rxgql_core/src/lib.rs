//! Shared primitives for rxgql.
//!
//! This crate carries the pieces that both the syntax and runtime layers
//! need without knowing anything about GraphQL itself:
//! - `span`: byte-offset spans into a source string
//! - `line_index`: mapping byte offsets to 1-based line/column locations

pub mod line_index;
pub mod span;

pub use line_index::{LineIndex, SourceLocation};
pub use span::Span;
