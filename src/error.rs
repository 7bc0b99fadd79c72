//! Error types for the anchoring subsystem
//!
//! The first four variants are the "soft" conditions of anchoring. They are
//! handled where they occur and never abort the host: a missing quote or an
//! empty span leaves the annotation pending/orphaned, a detached marker is
//! skipped, an unreachable channel keeps the previous status.

use thiserror::Error;

use crate::dom::NodeId;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Anchoring error type
#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("No match above threshold for quote: {0}")]
    NoMatch(String),

    #[error("Range contains no highlightable text")]
    EmptySpan,

    #[error("Marker {0:?} is no longer attached to the document")]
    DetachedNode(NodeId),

    #[error("Status channel unavailable: {0}")]
    ChannelUnavailable(#[from] ChannelError),

    #[error("Invalid range boundary: {0}")]
    InvalidBoundary(String),

    #[error("XHTML parsing error: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AnchorError {
    /// Whether this is a status channel failure, which callers log and
    /// otherwise ignore
    pub fn is_channel_unavailable(&self) -> bool {
        matches!(self, AnchorError::ChannelUnavailable(_))
    }
}

/// Cross-context messaging errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Responder is gone")]
    Closed,

    #[error("Request dropped before a response was sent")]
    NoResponse,

    #[error("Transport error: {0}")]
    Transport(String),
}
