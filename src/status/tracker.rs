//! Per-annotation anchor status state machine
//!
//! ```text
//! pending   -> anchored | orphaned
//! anchored  -> orphaned            (guarded)
//! orphaned  -> recovered
//! recovered -> orphaned            (guarded)
//! ```
//!
//! Once an id has been anchored, reports of it being orphaned that come
//! from elsewhere (another frame, a snapshot) are discarded: they are most
//! likely stale. Only a fresh failed attempt in this context moves an
//! anchored id back to orphaned.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{AnchorStatus, StatusChange, StatusSnapshot};

/// Something that may change an annotation's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The target became known
    Registered,
    /// A fresh local anchoring attempt found the target
    AttemptSucceeded,
    /// A fresh local anchoring attempt did not find the target
    AttemptFailed,
    /// Status relayed from another context
    Reported(AnchorStatus),
}

/// Whether the "ever anchored" guard discards `event`
pub fn is_stale(event: StatusEvent, ever_anchored: bool) -> bool {
    ever_anchored && event == StatusEvent::Reported(AnchorStatus::Orphaned)
}

/// Next status after `event`, or `None` if the status does not change
pub fn transition(
    current: Option<AnchorStatus>,
    event: StatusEvent,
    ever_anchored: bool,
) -> Option<AnchorStatus> {
    use AnchorStatus::*;

    if is_stale(event, ever_anchored) {
        return None;
    }
    let next = match (event, current) {
        (StatusEvent::Registered, None) => Pending,
        (StatusEvent::Registered, Some(_)) => return None,
        (StatusEvent::AttemptSucceeded, Some(Orphaned | Recovered)) => Recovered,
        (StatusEvent::AttemptSucceeded, _) => Anchored,
        (StatusEvent::AttemptFailed, _) => Orphaned,
        // A frame that only just registered the id knows less than we do
        (StatusEvent::Reported(Pending), Some(_)) => return None,
        (StatusEvent::Reported(status), _) => status,
    };
    (current != Some(next)).then_some(next)
}

/// Status of every annotation known to one context
#[derive(Debug, Default)]
pub struct StatusTracker {
    statuses: HashMap<String, AnchorStatus>,
    /// Ids seen anchored or recovered since their last fresh failure
    ever_anchored: HashSet<String>,
    /// Revision of the last snapshot applied
    last_snapshot: Option<DateTime<Utc>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event` to `annotation_id`
    pub fn apply(&mut self, annotation_id: &str, event: StatusEvent) -> Option<StatusChange> {
        let current = self.status(annotation_id);
        let ever_anchored = self.ever_anchored.contains(annotation_id);

        if event == StatusEvent::AttemptFailed {
            self.ever_anchored.remove(annotation_id);
        }

        let Some(next) = transition(current, event, ever_anchored) else {
            if is_stale(event, ever_anchored) {
                debug!("Discarding stale orphaned report for {}", annotation_id);
            }
            return None;
        };

        if next.is_anchored() {
            self.ever_anchored.insert(annotation_id.to_string());
        }
        self.statuses.insert(annotation_id.to_string(), next);

        Some(StatusChange {
            annotation_id: annotation_id.to_string(),
            previous: current,
            status: next,
        })
    }

    /// Start tracking `annotation_id` as pending
    pub fn register(&mut self, annotation_id: &str) -> Option<StatusChange> {
        self.apply(annotation_id, StatusEvent::Registered)
    }

    /// Record the outcome of a fresh local anchoring attempt
    pub fn record_attempt(&mut self, annotation_id: &str, found: bool) -> Option<StatusChange> {
        let event = if found {
            StatusEvent::AttemptSucceeded
        } else {
            StatusEvent::AttemptFailed
        };
        self.apply(annotation_id, event)
    }

    /// Apply a status reported by another context
    pub fn apply_report(
        &mut self,
        annotation_id: &str,
        status: AnchorStatus,
    ) -> Option<StatusChange> {
        self.apply(annotation_id, StatusEvent::Reported(status))
    }

    /// Apply a snapshot if it is strictly newer than the last one applied.
    ///
    /// Ids missing from the snapshot keep their status.
    pub fn apply_snapshot(&mut self, snapshot: &StatusSnapshot) -> Vec<StatusChange> {
        if let Some(last) = self.last_snapshot {
            if snapshot.revision <= last {
                debug!(
                    "Ignoring snapshot {} (last applied {})",
                    snapshot.revision, last
                );
                return Vec::new();
            }
        }
        self.last_snapshot = Some(snapshot.revision);

        snapshot
            .statuses()
            .filter_map(|(id, status)| self.apply_report(id, status))
            .collect()
    }

    pub fn status(&self, annotation_id: &str) -> Option<AnchorStatus> {
        self.statuses.get(annotation_id).copied()
    }

    pub fn was_ever_anchored(&self, annotation_id: &str) -> bool {
        self.ever_anchored.contains(annotation_id)
    }

    pub fn last_snapshot(&self) -> Option<DateTime<Utc>> {
        self.last_snapshot
    }

    /// Every `(id, status)` pair, in no particular order
    pub fn statuses(&self) -> impl Iterator<Item = (&str, AnchorStatus)> + '_ {
        self.statuses.iter().map(|(id, status)| (id.as_str(), *status))
    }

    /// Current state as a snapshot with the given revision
    pub fn snapshot(&self, revision: DateTime<Utc>) -> StatusSnapshot {
        StatusSnapshot::from_statuses(revision, self.statuses())
    }

    /// Forget everything, as when the page is navigated away
    pub fn reset(&mut self) {
        self.statuses.clear();
        self.ever_anchored.clear();
        self.last_snapshot = None;
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use AnchorStatus::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(None, StatusEvent::Registered, false), Some(Pending));
        assert_eq!(transition(Some(Anchored), StatusEvent::Registered, true), None);
        assert_eq!(
            transition(Some(Pending), StatusEvent::AttemptSucceeded, false),
            Some(Anchored)
        );
        assert_eq!(
            transition(Some(Pending), StatusEvent::AttemptFailed, false),
            Some(Orphaned)
        );
        assert_eq!(
            transition(Some(Orphaned), StatusEvent::AttemptSucceeded, false),
            Some(Recovered)
        );
        assert_eq!(
            transition(Some(Recovered), StatusEvent::AttemptFailed, true),
            Some(Orphaned)
        );
        assert_eq!(transition(Some(Anchored), StatusEvent::AttemptSucceeded, true), None);
        assert_eq!(transition(Some(Recovered), StatusEvent::AttemptSucceeded, true), None);
    }

    #[test]
    fn test_guard_discards_stale_orphaned() {
        let orphaned = StatusEvent::Reported(Orphaned);
        assert!(is_stale(orphaned, true));
        assert!(!is_stale(orphaned, false));
        assert!(!is_stale(StatusEvent::AttemptFailed, true));

        assert_eq!(transition(Some(Anchored), orphaned, true), None);
        assert_eq!(transition(Some(Recovered), orphaned, true), None);
        assert_eq!(transition(Some(Pending), orphaned, false), Some(Orphaned));
    }

    #[test]
    fn test_pending_report_does_not_reset() {
        let pending = StatusEvent::Reported(Pending);
        assert_eq!(transition(Some(Anchored), pending, true), None);
        assert_eq!(transition(Some(Orphaned), pending, false), None);
        assert_eq!(transition(None, pending, false), Some(Pending));
    }

    #[test]
    fn test_stale_push_after_anchoring() {
        let mut tracker = StatusTracker::new();
        tracker.register("a1");
        let change = tracker.record_attempt("a1", true).unwrap();
        assert_eq!(change.previous, Some(Pending));
        assert_eq!(change.status, Anchored);

        assert!(tracker.apply_report("a1", Orphaned).is_none());
        assert_eq!(tracker.status("a1"), Some(Anchored));
    }

    #[test]
    fn test_fresh_failure_downgrades() {
        let mut tracker = StatusTracker::new();
        tracker.record_attempt("a1", true);
        assert!(tracker.was_ever_anchored("a1"));

        let change = tracker.record_attempt("a1", false).unwrap();
        assert_eq!(change.status, Orphaned);
        assert!(!tracker.was_ever_anchored("a1"));

        // The guard is lifted until the next success
        tracker.apply_report("a1", Recovered);
        assert_eq!(tracker.status("a1"), Some(Recovered));
        assert!(tracker.apply_report("a1", Orphaned).is_none());
    }

    #[test]
    fn test_recovery() {
        let mut tracker = StatusTracker::new();
        tracker.register("a1");
        tracker.record_attempt("a1", false);
        assert_eq!(tracker.status("a1"), Some(Orphaned));
        assert_eq!(tracker.record_attempt("a1", true).unwrap().status, Recovered);
        assert!(tracker.record_attempt("a1", true).is_none());
    }

    #[test]
    fn test_snapshot_applied_only_if_newer() {
        let mut tracker = StatusTracker::new();
        let revision = Utc::now();
        let snapshot = StatusSnapshot::from_statuses(
            revision,
            [("a1", Anchored), ("a2", Orphaned), ("a3", Pending)],
        );

        assert_eq!(tracker.apply_snapshot(&snapshot).len(), 3);
        assert_eq!(tracker.last_snapshot(), Some(revision));
        assert_eq!(tracker.status("a2"), Some(Orphaned));

        // Same revision again: no-op, even with different content
        let replay = StatusSnapshot::from_statuses(revision, [("a2", Recovered)]);
        assert!(tracker.apply_snapshot(&replay).is_empty());
        assert_eq!(tracker.status("a2"), Some(Orphaned));

        let older =
            StatusSnapshot::from_statuses(revision - Duration::seconds(1), [("a2", Recovered)]);
        assert!(tracker.apply_snapshot(&older).is_empty());

        let newer = StatusSnapshot::from_statuses(
            revision + Duration::seconds(1),
            [("a1", Orphaned), ("a2", Recovered)],
        );
        let changes = tracker.apply_snapshot(&newer);
        assert_eq!(changes.len(), 1);
        assert_eq!(tracker.status("a1"), Some(Anchored));
        assert_eq!(tracker.status("a2"), Some(Recovered));
        assert_eq!(tracker.status("a3"), Some(Pending));
    }

    #[test]
    fn test_snapshot_of_tracker() {
        let mut tracker = StatusTracker::new();
        tracker.register("a2");
        tracker.record_attempt("a1", true);
        let snapshot = tracker.snapshot(Utc::now());
        assert_eq!(snapshot.anchored, vec!["a1"]);
        assert_eq!(snapshot.pending, vec!["a2"]);
    }

    #[test]
    fn test_reset() {
        let mut tracker = StatusTracker::new();
        tracker.record_attempt("a1", true);
        tracker.apply_snapshot(&StatusSnapshot::from_statuses(Utc::now(), Vec::new()));
        tracker.reset();

        assert!(tracker.is_empty());
        assert!(!tracker.was_ever_anchored("a1"));
        assert!(tracker.last_snapshot().is_none());
        assert_eq!(tracker.apply_report("a1", Orphaned).unwrap().status, Orphaned);
    }
}
