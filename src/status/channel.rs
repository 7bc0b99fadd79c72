//! Cross-context status messaging
//!
//! Frames push the outcome of their anchoring attempts and pull full
//! snapshots from a coordinating hub. [`LocalHub`] is the in-process hub:
//! an actor task owning the authoritative tracker, driven over a tokio
//! mpsc queue with oneshot replies.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ChannelError;

use super::tracker::StatusTracker;
use super::types::{AnchorStatus, FrameId, StatusSnapshot, StatusUpdate};

/// Default queue depth of a [`LocalHub`]
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// Messaging between a frame and the hub
#[async_trait]
pub trait StatusChannel: Send + Sync {
    /// Report a status to the hub
    async fn push(&self, update: StatusUpdate) -> Result<(), ChannelError>;

    /// Fetch the hub's full status
    async fn request_snapshot(&self) -> Result<StatusSnapshot, ChannelError>;
}

enum HubMessage {
    Push(StatusUpdate),
    Snapshot(oneshot::Sender<StatusSnapshot>),
}

/// Handle to an in-process status hub
#[derive(Clone)]
pub struct LocalHub {
    sender: mpsc::Sender<HubMessage>,
}

impl LocalHub {
    /// Start the hub task on the current runtime. The task ends once every
    /// handle is dropped.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_hub(receiver, HubState::new()));
        (Self { sender }, task)
    }
}

#[async_trait]
impl StatusChannel for LocalHub {
    async fn push(&self, update: StatusUpdate) -> Result<(), ChannelError> {
        self.sender
            .send(HubMessage::Push(update))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    async fn request_snapshot(&self) -> Result<StatusSnapshot, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(HubMessage::Snapshot(reply))
            .await
            .map_err(|_| ChannelError::Closed)?;
        response.await.map_err(|_| ChannelError::NoResponse)
    }
}

async fn run_hub(mut receiver: mpsc::Receiver<HubMessage>, mut state: HubState) {
    while let Some(message) = receiver.recv().await {
        match message {
            HubMessage::Push(update) => state.apply(&update),
            HubMessage::Snapshot(reply) => {
                // The requester may have given up; nothing to do then
                let _ = reply.send(state.snapshot());
            }
        }
    }
    debug!("Status hub stopped");
}

/// Aggregated status across frames
struct HubState {
    tracker: StatusTracker,
    /// Frame that last reported each id anchored
    owners: HashMap<String, FrameId>,
    revision: DateTime<Utc>,
}

impl HubState {
    fn new() -> Self {
        Self {
            tracker: StatusTracker::new(),
            owners: HashMap::new(),
            revision: Utc::now(),
        }
    }

    fn apply(&mut self, update: &StatusUpdate) {
        let id = update.annotation_id.as_str();
        let owned_by_source = self.owners.get(id) == Some(&update.source);

        // An orphaned report from the frame that had the id anchored is that
        // frame's fresh failure; from any other frame it goes through the guard.
        let change = match update.status {
            AnchorStatus::Orphaned if owned_by_source => {
                self.owners.remove(id);
                self.tracker.record_attempt(id, false)
            }
            status => self.tracker.apply_report(id, status),
        };

        if update.status.is_anchored() {
            self.owners.insert(id.to_string(), update.source);
        }
        if let Some(change) = change {
            debug!(
                "Hub: {} {:?} -> {} (from frame {})",
                change.annotation_id, change.previous, change.status, update.source
            );
            self.bump_revision();
        }
    }

    fn bump_revision(&mut self) {
        let now = Utc::now();
        self.revision = if now > self.revision {
            now
        } else {
            self.revision + Duration::nanoseconds(1)
        };
    }

    fn snapshot(&self) -> StatusSnapshot {
        self.tracker.snapshot(self.revision)
    }
}
