//! Status replication for one frame
//!
//! [`StatusSync`] owns the frame's tracker and keeps it in step with the
//! hub: attempt outcomes are pushed fire-and-forget, snapshots are pulled
//! on demand or by a background poller. Channel failures are logged and
//! the local state is kept.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AnchorError, Result};

use super::channel::StatusChannel;
use super::tracker::StatusTracker;
use super::types::{AnchorStatus, FrameId, StatusChange, StatusUpdate};

type Callback = Arc<dyn Fn(&StatusChange) + Send + Sync>;

/// A frame's view of annotation status, shared with its poller task
#[derive(Clone)]
pub struct StatusSync {
    inner: Arc<StatusSyncInner>,
}

struct StatusSyncInner {
    frame: FrameId,
    tracker: RwLock<StatusTracker>,
    channel: Arc<dyn StatusChannel>,
    subscribers: Mutex<HashMap<u64, Callback>>,
    next_subscriber: AtomicU64,
}

/// Handle returned by [`StatusSync::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Weak<StatusSyncInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().remove(&self.id);
        }
    }
}

impl StatusSync {
    pub fn new(channel: Arc<dyn StatusChannel>) -> Self {
        Self::with_frame(FrameId::new(), channel)
    }

    pub fn with_frame(frame: FrameId, channel: Arc<dyn StatusChannel>) -> Self {
        Self {
            inner: Arc::new(StatusSyncInner {
                frame,
                tracker: RwLock::new(StatusTracker::new()),
                channel,
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
            }),
        }
    }

    pub fn frame(&self) -> FrameId {
        self.inner.frame
    }

    pub fn status(&self, annotation_id: &str) -> Option<AnchorStatus> {
        self.inner.tracker.read().status(annotation_id)
    }

    /// Every known `(id, status)`, sorted by id
    pub fn statuses(&self) -> Vec<(String, AnchorStatus)> {
        let mut statuses: Vec<(String, AnchorStatus)> = self
            .inner
            .tracker
            .read()
            .statuses()
            .map(|(id, status)| (id.to_string(), status))
            .collect();
        statuses.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Start tracking `annotation_id` as pending
    pub fn register(&self, annotation_id: &str) {
        let change = self.inner.tracker.write().register(annotation_id);
        if let Some(change) = change {
            self.publish(StatusUpdate::new(annotation_id, change.status, self.frame()));
            self.notify(&[change]);
        }
    }

    /// Record the outcome of a fresh anchoring attempt in this frame and
    /// publish the resulting status
    pub fn record_attempt(&self, annotation_id: &str, found: bool) -> Option<StatusChange> {
        let (change, status) = {
            let mut tracker = self.inner.tracker.write();
            let change = tracker.record_attempt(annotation_id, found);
            (change, tracker.status(annotation_id))
        };

        // Published even when unchanged: the hub may not have seen it yet
        if let Some(status) = status {
            self.publish(StatusUpdate::new(annotation_id, status, self.frame()));
        }
        if let Some(change) = &change {
            self.notify(std::slice::from_ref(change));
        }
        change
    }

    /// Push `update` to the hub without waiting.
    ///
    /// Needs a tokio runtime; without one the update is dropped and logged.
    pub fn publish(&self, update: StatusUpdate) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "No async runtime, status of {} not published",
                update.annotation_id
            );
            return;
        };
        let channel = Arc::clone(&self.inner.channel);
        runtime.spawn(async move {
            let annotation_id = update.annotation_id.clone();
            if let Err(e) = channel.push(update).await {
                warn!(
                    "Failed to publish status of {}: {}",
                    annotation_id,
                    AnchorError::from(e)
                );
            }
        });
    }

    /// Pull a snapshot from the hub and apply it if newer. Returns the
    /// number of statuses that changed.
    pub async fn refresh(&self) -> Result<usize> {
        let snapshot = self.inner.channel.request_snapshot().await?;
        let changes = self.inner.tracker.write().apply_snapshot(&snapshot);
        if !changes.is_empty() {
            debug!(
                "Snapshot {} changed {} statuses in frame {}",
                snapshot.revision,
                changes.len(),
                self.frame()
            );
            self.notify(&changes);
        }
        Ok(changes.len())
    }

    /// Refresh on a fixed interval until the returned task is aborted
    pub fn spawn_poller(&self, period: Duration) -> JoinHandle<()> {
        let sync = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                if let Err(e) = sync.refresh().await {
                    warn!("Status poll failed in frame {}: {}", sync.frame(), e);
                }
            }
        })
    }

    /// Call `callback` on every status change in this frame
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().insert(id, Arc::new(callback));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Forget all status, as when the page is navigated away
    pub fn reset(&self) {
        self.inner.tracker.write().reset();
    }

    fn notify(&self, changes: &[StatusChange]) {
        // Callbacks run without the lock so they may subscribe or unsubscribe
        let callbacks: Vec<Callback> = self.inner.subscribers.lock().values().cloned().collect();
        for change in changes {
            for callback in &callbacks {
                callback(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::status::{LocalHub, StatusSnapshot, DEFAULT_HUB_CAPACITY};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl StatusChannel for Unreachable {
        async fn push(&self, _update: StatusUpdate) -> std::result::Result<(), ChannelError> {
            Err(ChannelError::Transport("frame detached".to_string()))
        }

        async fn request_snapshot(&self) -> std::result::Result<StatusSnapshot, ChannelError> {
            Err(ChannelError::NoResponse)
        }
    }

    /// Let spawned publish tasks run
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_status_replicates_between_frames() {
        let (hub, _task) = LocalHub::spawn(DEFAULT_HUB_CAPACITY);
        let hub: Arc<dyn StatusChannel> = Arc::new(hub);
        let a = StatusSync::new(Arc::clone(&hub));
        let b = StatusSync::new(Arc::clone(&hub));

        a.register("a1");
        a.record_attempt("a1", true);
        settle().await;

        assert_eq!(b.status("a1"), None);
        assert_eq!(b.refresh().await.unwrap(), 1);
        assert_eq!(b.status("a1"), Some(AnchorStatus::Anchored));

        // Nothing new on the hub: applying again is a no-op
        assert_eq!(b.refresh().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_orphan_from_other_frame() {
        let (hub, _task) = LocalHub::spawn(DEFAULT_HUB_CAPACITY);
        let hub: Arc<dyn StatusChannel> = Arc::new(hub);
        let a = StatusSync::new(Arc::clone(&hub));
        let b = StatusSync::new(Arc::clone(&hub));

        a.record_attempt("a1", true);
        settle().await;
        b.refresh().await.unwrap();

        // Frame b does not have the passage
        b.record_attempt("a1", false);
        settle().await;
        a.refresh().await.unwrap();
        assert_eq!(a.status("a1"), Some(AnchorStatus::Anchored));

        // A fresh local failure in frame a does downgrade it
        a.record_attempt("a1", false);
        assert_eq!(a.status("a1"), Some(AnchorStatus::Orphaned));
    }

    #[tokio::test]
    async fn test_channel_failure_keeps_state() {
        let sync = StatusSync::new(Arc::new(Unreachable));
        sync.record_attempt("a1", true);
        settle().await;

        let err = sync.refresh().await.unwrap_err();
        assert!(err.is_channel_unavailable());
        assert_eq!(sync.status("a1"), Some(AnchorStatus::Anchored));
    }

    #[test]
    fn test_publish_without_runtime() {
        let sync = StatusSync::new(Arc::new(Unreachable));
        sync.register("a1");
        assert_eq!(sync.status("a1"), Some(AnchorStatus::Pending));
    }

    #[tokio::test]
    async fn test_subscriptions() {
        let sync = StatusSync::new(Arc::new(Unreachable));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let subscription = sync.subscribe(move |change| {
            sink.lock().push((change.annotation_id.clone(), change.status));
        });

        sync.register("a1");
        sync.record_attempt("a1", true);
        sync.record_attempt("a1", true);
        subscription.unsubscribe();
        sync.record_attempt("a1", false);

        assert_eq!(
            *seen.lock(),
            vec![
                ("a1".to_string(), AnchorStatus::Pending),
                ("a1".to_string(), AnchorStatus::Anchored),
            ]
        );
    }

    #[tokio::test]
    async fn test_poller_applies_snapshots() {
        let (hub, _task) = LocalHub::spawn(DEFAULT_HUB_CAPACITY);
        let hub: Arc<dyn StatusChannel> = Arc::new(hub);
        let a = StatusSync::new(Arc::clone(&hub));
        let b = StatusSync::new(Arc::clone(&hub));

        let poller = b.spawn_poller(Duration::from_millis(10));
        a.record_attempt("a1", false);

        let mut status = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = b.status("a1");
            if status.is_some() {
                break;
            }
        }
        poller.abort();
        assert_eq!(status, Some(AnchorStatus::Orphaned));
    }
}
