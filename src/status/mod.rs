//! Anchor status tracking across frames
//!
//! - [`StatusTracker`]: per-annotation state machine with the stale-report guard
//! - [`StatusChannel`] / [`LocalHub`]: push/snapshot messaging with a hub
//! - [`StatusSync`]: a frame's tracker kept in step with the hub

mod channel;
mod sync;
mod tracker;
mod types;

pub use channel::{LocalHub, StatusChannel, DEFAULT_HUB_CAPACITY};
pub use sync::{StatusSync, Subscription};
pub use tracker::{is_stale, transition, StatusEvent, StatusTracker};
pub use types::{AnchorStatus, FrameId, StatusChange, StatusSnapshot, StatusUpdate};
