//! Document tree model
//!
//! - [`TextTree`] / [`TextTreeMut`]: the narrow interface to a document
//! - [`Document`]: in-memory arena implementation
//! - [`TextIndex`]: document text and node offsets
//! - [`trim_range`]: whitespace trimming of spans

mod document;
mod range;
mod tree;
mod trim;

pub use document::Document;
pub use range::{Boundary, TextIndex, TextPosition, TextRange};
pub use tree::{NodeId, TextTree, TextTreeMut, NON_CONTENT_TAGS};
pub use trim::trim_range;
