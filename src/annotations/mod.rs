//! Annotation targets

mod types;

pub use types::{AnnotationTarget, Selector};
