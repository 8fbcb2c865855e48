//! The task record and its delta forms.
//!
//! All timestamps are wall-clock milliseconds since the Unix epoch,
//! exchanged across peers as-is. Per-field timestamps (`title_updated_at`,
//! `notes_updated_at`, `completed_updated_at`) move only when their own
//! field is written and drive the per-field last-writer-wins merge.

use crate::{PeerId, SyncError, TaskId};
use serde::{Deserialize, Serialize};

/// A task row as persisted in the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Stable task id.
    pub id: TaskId,
    /// Remote peer's id for this task, once bound.
    pub peer_id: Option<PeerId>,
    /// Task title.
    pub title: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Completion flag.
    pub completed: bool,
    /// Priority, 0 (none) to 3 (high).
    pub priority: i64,
    /// Due date (ms since epoch).
    pub due_date: Option<i64>,
    /// Due time of day (ms since epoch).
    pub due_time: Option<i64>,
    /// Whether a reminder is requested.
    pub reminder: bool,
    /// When the reminder fires (ms since epoch).
    pub reminder_time: Option<i64>,
    /// Whether the task repeats.
    pub repeating: bool,
    /// Tombstone flag; tombstones stay in the table until purged.
    pub deleted: bool,
    /// Timestamp of the last title write.
    pub title_updated_at: i64,
    /// Timestamp of the last notes write.
    pub notes_updated_at: i64,
    /// Timestamp of the last completed write.
    pub completed_updated_at: i64,
    /// Timestamp of the last write to any field.
    pub updated_at: i64,
    /// Last time this record's state was acknowledged by the peer.
    pub synced_at: i64,
    /// Whether the record carries unacknowledged local changes.
    pub dirty: bool,
}

impl Task {
    /// Build a fresh local task from creation fields.
    ///
    /// All per-field timestamps start at `now`; the record is dirty until
    /// the corresponding CREATE operation is acknowledged.
    pub fn new_local(fields: NewTask, now: i64) -> Self {
        Self {
            id: TaskId::generate(),
            peer_id: None,
            title: fields.title,
            notes: fields.notes,
            completed: false,
            priority: fields.priority,
            due_date: fields.due_date,
            due_time: fields.due_time,
            reminder: fields.reminder,
            reminder_time: fields.reminder_time,
            repeating: fields.repeating,
            deleted: false,
            title_updated_at: now,
            notes_updated_at: now,
            completed_updated_at: now,
            updated_at: now,
            synced_at: 0,
            dirty: true,
        }
    }
}

/// Creation fields for a new local task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Task title.
    pub title: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Priority, 0 to 3.
    pub priority: i64,
    /// Due date (ms since epoch).
    pub due_date: Option<i64>,
    /// Due time of day (ms since epoch).
    pub due_time: Option<i64>,
    /// Whether a reminder is requested.
    pub reminder: bool,
    /// When the reminder fires.
    pub reminder_time: Option<i64>,
    /// Whether the task repeats.
    pub repeating: bool,
}

impl NewTask {
    /// Convenience constructor with just a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A partial task update as carried on the bus.
///
/// Every field is optional; absent fields are untouched by the merge. A
/// `due_date` of `0` means "unset" on the wire and is normalized to `None`
/// by [`TaskDelta::normalized_due_date`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskDelta {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Timestamp of the title write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_updated_at: Option<i64>,
    /// New notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Timestamp of the notes write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes_updated_at: Option<i64>,
    /// New completion flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Timestamp of the completed write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_updated_at: Option<i64>,
    /// Tombstone marker; `true` deletes the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    /// New priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// New due date; `0` means unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    /// Peer id binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
}

impl TaskDelta {
    /// Serialize to bus payload bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from bus payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }

    /// The due date with the wire sentinel applied: `Some(0)` becomes `None`.
    pub fn normalized_due_date(&self) -> Option<i64> {
        match self.due_date {
            Some(0) => None,
            other => other,
        }
    }

    /// Whether this delta is a tombstone.
    pub fn is_delete(&self) -> bool {
        self.deleted == Some(true)
    }

    /// The highest per-field timestamp carried by this delta, if any.
    pub fn max_field_timestamp(&self) -> Option<i64> {
        [
            self.title_updated_at,
            self.notes_updated_at,
            self.completed_updated_at,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_local_task_is_dirty() {
        let task = Task::new_local(NewTask::titled("Milk"), 100);
        assert!(task.dirty);
        assert!(!task.deleted);
        assert_eq!(task.title, "Milk");
        assert_eq!(task.title_updated_at, 100);
        assert_eq!(task.updated_at, 100);
        assert_eq!(task.synced_at, 0);
        assert!(task.peer_id.is_none());
    }

    #[test]
    fn delta_wire_names_are_camel_case() {
        let delta = TaskDelta {
            title: Some("A".into()),
            title_updated_at: Some(20),
            ..TaskDelta::default()
        };
        let json: serde_json::Value =
            serde_json::from_slice(&delta.to_bytes().unwrap()).unwrap();
        assert_eq!(json["title"], "A");
        assert_eq!(json["titleUpdatedAt"], 20);
        assert!(json.get("notes").is_none(), "absent fields are omitted");
    }

    #[test]
    fn delta_roundtrip() {
        let delta = TaskDelta {
            notes: Some("n2".into()),
            notes_updated_at: Some(25),
            peer_id: Some(PeerId::new(42)),
            ..TaskDelta::default()
        };
        let restored = TaskDelta::from_bytes(&delta.to_bytes().unwrap()).unwrap();
        assert_eq!(delta, restored);
    }

    #[test]
    fn delta_tolerates_unknown_keys() {
        let delta =
            TaskDelta::from_bytes(br#"{"title":"X","titleUpdatedAt":5,"extra":true}"#).unwrap();
        assert_eq!(delta.title.as_deref(), Some("X"));
        assert_eq!(delta.title_updated_at, Some(5));
    }

    #[test]
    fn due_date_zero_means_unset() {
        let delta = TaskDelta {
            due_date: Some(0),
            ..TaskDelta::default()
        };
        assert_eq!(delta.normalized_due_date(), None);

        let delta = TaskDelta {
            due_date: Some(1_700_000_000_000),
            ..TaskDelta::default()
        };
        assert_eq!(delta.normalized_due_date(), Some(1_700_000_000_000));
    }

    #[test]
    fn max_field_timestamp_picks_highest() {
        let delta = TaskDelta {
            title_updated_at: Some(10),
            completed_updated_at: Some(30),
            ..TaskDelta::default()
        };
        assert_eq!(delta.max_field_timestamp(), Some(30));
        assert_eq!(TaskDelta::default().max_field_timestamp(), None);
    }
}
