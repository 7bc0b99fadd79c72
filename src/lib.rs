//! Amnesia Anchor
//!
//! Relocates stored text selections in a document and marks them with
//! highlight elements, even after the text was re-rendered or lightly
//! edited, and keeps track of which annotations are currently shown.
//!
//! # Modules
//!
//! - `text`: quote matching and Unicode-aware offset translation
//! - `dom`: document tree interface, in-memory tree, range trimming
//! - `html`: highlight markers and point hit testing
//! - `status`: anchor status state machine and its replication across frames
//! - `anchor`: the anchoring facade tying the above together
//! - `annotations`: stored annotation targets and W3C selectors

pub mod anchor;
pub mod annotations;
pub mod config;
pub mod dom;
pub mod error;
pub mod html;
pub mod status;
pub mod text;

pub use anchor::{describe_range, AnchorContext, AnchorOutcome};
pub use annotations::{AnnotationTarget, Selector};
pub use config::Config;
pub use error::{AnchorError, ChannelError, Result};
