//! Status data types
//!
//! Defines the wire types exchanged between rendering frames and the
//! coordinating hub:
//! - Per-annotation anchor status
//! - Incremental status updates pushed by a frame
//! - Full snapshots served by the hub, versioned by revision timestamp

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether an annotation is currently shown in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    /// Registered, no anchoring attempt resolved yet
    Pending,
    /// Found and highlighted
    Anchored,
    /// Target text could not be found
    Orphaned,
    /// Found again after having been orphaned
    Recovered,
}

impl AnchorStatus {
    /// Anchored or recovered
    pub fn is_anchored(self) -> bool {
        matches!(self, AnchorStatus::Anchored | AnchorStatus::Recovered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnchorStatus::Pending => "pending",
            AnchorStatus::Anchored => "anchored",
            AnchorStatus::Orphaned => "orphaned",
            AnchorStatus::Recovered => "recovered",
        }
    }
}

impl fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one rendering frame (execution context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub Uuid);

impl FrameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one anchoring attempt, pushed by the frame that made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub annotation_id: String,
    pub status: AnchorStatus,
    /// Frame that made the attempt
    pub source: FrameId,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(annotation_id: &str, status: AnchorStatus, source: FrameId) -> Self {
        Self {
            annotation_id: annotation_id.to_string(),
            status,
            source,
            at: Utc::now(),
        }
    }
}

/// Full status of every known annotation, as seen by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Time of the last change included; strictly increasing per hub
    pub revision: DateTime<Utc>,
    #[serde(default)]
    pub anchored: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub orphaned: Vec<String>,
    #[serde(default)]
    pub recovered: Vec<String>,
}

impl StatusSnapshot {
    /// Group `(id, status)` pairs into a snapshot. Ids are sorted within
    /// each group.
    pub fn from_statuses<'a, I>(revision: DateTime<Utc>, statuses: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, AnchorStatus)>,
    {
        let mut snapshot = Self {
            revision,
            anchored: Vec::new(),
            pending: Vec::new(),
            orphaned: Vec::new(),
            recovered: Vec::new(),
        };
        for (id, status) in statuses {
            let group = match status {
                AnchorStatus::Anchored => &mut snapshot.anchored,
                AnchorStatus::Pending => &mut snapshot.pending,
                AnchorStatus::Orphaned => &mut snapshot.orphaned,
                AnchorStatus::Recovered => &mut snapshot.recovered,
            };
            group.push(id.to_string());
        }
        for group in [
            &mut snapshot.anchored,
            &mut snapshot.pending,
            &mut snapshot.orphaned,
            &mut snapshot.recovered,
        ] {
            group.sort_unstable();
        }
        snapshot
    }

    /// Every `(id, status)` pair in the snapshot
    pub fn statuses(&self) -> impl Iterator<Item = (&str, AnchorStatus)> + '_ {
        tagged(&self.pending, AnchorStatus::Pending)
            .chain(tagged(&self.anchored, AnchorStatus::Anchored))
            .chain(tagged(&self.orphaned, AnchorStatus::Orphaned))
            .chain(tagged(&self.recovered, AnchorStatus::Recovered))
    }

    pub fn len(&self) -> usize {
        self.anchored.len() + self.pending.len() + self.orphaned.len() + self.recovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tagged(ids: &[String], status: AnchorStatus) -> impl Iterator<Item = (&str, AnchorStatus)> + '_ {
    ids.iter().map(move |id| (id.as_str(), status))
}

/// A status change observed by a tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub annotation_id: String,
    /// `None` when the id was not known before
    pub previous: Option<AnchorStatus>,
    pub status: AnchorStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&AnchorStatus::Recovered).unwrap(),
            "\"recovered\""
        );
        assert!(AnchorStatus::Recovered.is_anchored());
        assert!(!AnchorStatus::Orphaned.is_anchored());
        assert_eq!(AnchorStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_update_wire_format() {
        let update = StatusUpdate::new("a1", AnchorStatus::Anchored, FrameId::new());
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["annotationId"], "a1");
        assert_eq!(json["status"], "anchored");
        assert!(json["source"].is_string());

        let parsed: StatusUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, update);
    }

    #[test]
    fn test_snapshot_grouping() {
        let snapshot = StatusSnapshot::from_statuses(
            Utc::now(),
            [
                ("b", AnchorStatus::Anchored),
                ("a", AnchorStatus::Anchored),
                ("c", AnchorStatus::Orphaned),
                ("d", AnchorStatus::Pending),
            ],
        );
        assert_eq!(snapshot.anchored, vec!["a", "b"]);
        assert_eq!(snapshot.orphaned, vec!["c"]);
        assert_eq!(snapshot.pending, vec!["d"]);
        assert!(snapshot.recovered.is_empty());
        assert_eq!(snapshot.len(), 4);

        let pairs: Vec<(&str, AnchorStatus)> = snapshot.statuses().collect();
        assert_eq!(pairs[0], ("d", AnchorStatus::Pending));
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn test_snapshot_missing_groups_default() {
        let json = r#"{"revision": "2024-01-01T00:00:00Z", "anchored": ["a1"]}"#;
        let snapshot: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.anchored, vec!["a1"]);
        assert!(snapshot.orphaned.is_empty());
    }
}
