//! Highlight markers and hit testing over a document tree

mod highlighter;

pub use highlighter::{HighlightConfig, Highlight, Highlighter};
pub use hit_test::{annotation_ids_at_point, markers_at_point, HitTestProvider, LayoutBoxes, Rect};
