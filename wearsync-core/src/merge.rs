//! Per-field last-writer-wins merge.
//!
//! This module provides a pure, side-effect-free merge function. Given
//! the local task (if any) and an inbound delta, it produces a list of
//! store actions to execute. The actual writes are performed by
//! `wearsync-engine` inside a single transaction, using the store's
//! conditional-update primitives, which re-check the timestamp
//! comparison atomically.
//!
//! Merge rules, in order:
//! 1. A tombstone delta wins outright: the remote peer is authoritative
//!    about its own deletions, and local edits racing a remote delete are
//!    discarded.
//! 2. If no local task exists, the delta materializes a new record that
//!    is already in sync (`dirty = false`).
//! 3. Content fields (`title`, `notes`, `completed`) apply only when the
//!    incoming per-field timestamp is strictly greater than the local
//!    one. Equal timestamps keep the local value.
//! 4. The peer id binds once and is never rebound.
//! 5. The peer is authoritative for the due date.

use wearsync_types::{PeerId, Task, TaskDelta, TaskId};

/// A single store write produced by the merge.
///
/// These are instructions, not side effects; `wearsync-engine` interprets
/// them against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
    /// Turn the record into a tombstone (or write a fresh tombstone row
    /// when no record exists), raising per-field timestamps to `at` so
    /// older inbound writes cannot resurrect it.
    Tombstone {
        /// Effective deletion timestamp.
        at: i64,
    },
    /// Insert a brand-new record supplied by the peer.
    Insert(Task),
    /// Write the title iff the timestamp is still strictly newer.
    SetTitleIfNewer {
        /// Incoming title.
        title: String,
        /// Incoming title timestamp.
        ts: i64,
    },
    /// Write the notes iff the timestamp is still strictly newer.
    SetNotesIfNewer {
        /// Incoming notes.
        notes: Option<String>,
        /// Incoming notes timestamp.
        ts: i64,
    },
    /// Write the completion flag iff the timestamp is still strictly newer.
    SetCompletedIfNewer {
        /// Incoming completion flag.
        completed: bool,
        /// Incoming completed timestamp.
        ts: i64,
    },
    /// Bind the peer id (only emitted when locally unset).
    SetPeerId(PeerId),
    /// Overwrite the due date (peer authority).
    SetDueDate(Option<i64>),
    /// Record that the task now reflects peer-supplied state.
    MarkSynced {
        /// Sync timestamp.
        at: i64,
    },
}

/// Merge an inbound delta against the local task.
///
/// Pure function of `(local, delta, now)`; `task_id` only names the
/// record the actions apply to. Returns an empty list when nothing is to
/// be written (the caller still records the op as processed).
pub fn merge(
    local: Option<&Task>,
    task_id: &TaskId,
    delta: &TaskDelta,
    now: i64,
) -> Vec<MergeAction> {
    if delta.is_delete() {
        // Tombstone even without a local row, so an older CREATE/UPDATE
        // arriving late cannot recreate the task.
        return vec![MergeAction::Tombstone {
            at: delta.max_field_timestamp().unwrap_or(now),
        }];
    }

    let Some(local) = local else {
        return vec![MergeAction::Insert(materialize(task_id, delta, now))];
    };

    if local.deleted {
        // Local tombstone outranks any non-delete delta.
        return Vec::new();
    }

    let mut actions = Vec::new();
    let mut content_written = false;

    if let Some(title) = &delta.title {
        let ts = delta.title_updated_at.unwrap_or(now);
        if ts > local.title_updated_at {
            actions.push(MergeAction::SetTitleIfNewer {
                title: title.clone(),
                ts,
            });
            content_written = true;
        }
    }

    if let Some(notes) = &delta.notes {
        let ts = delta.notes_updated_at.unwrap_or(now);
        if ts > local.notes_updated_at {
            actions.push(MergeAction::SetNotesIfNewer {
                notes: Some(notes.clone()),
                ts,
            });
            content_written = true;
        }
    }

    if let Some(completed) = delta.completed {
        let ts = delta.completed_updated_at.unwrap_or(now);
        if ts > local.completed_updated_at {
            actions.push(MergeAction::SetCompletedIfNewer { completed, ts });
            content_written = true;
        }
    }

    if local.peer_id.is_none() {
        if let Some(peer_id) = delta.peer_id {
            actions.push(MergeAction::SetPeerId(peer_id));
        }
    }

    if delta.due_date.is_some() {
        let due = delta.normalized_due_date();
        if due != local.due_date {
            actions.push(MergeAction::SetDueDate(due));
            content_written = true;
        }
    }

    if content_written {
        actions.push(MergeAction::MarkSynced { at: now });
    }

    actions
}

/// Build a fresh record from a peer-supplied delta (create-if-absent).
fn materialize(task_id: &TaskId, delta: &TaskDelta, now: i64) -> Task {
    let due_date = delta.normalized_due_date();
    let title_updated_at = delta.title_updated_at.unwrap_or(now);
    let notes_updated_at = delta.notes_updated_at.unwrap_or(now);
    let completed_updated_at = delta.completed_updated_at.unwrap_or(now);
    Task {
        id: task_id.clone(),
        peer_id: delta.peer_id,
        title: delta.title.clone().unwrap_or_default(),
        notes: delta.notes.clone(),
        completed: delta.completed.unwrap_or(false),
        priority: delta.priority.unwrap_or(0),
        due_date,
        due_time: None,
        // First import derives the reminder flag from the due date; the
        // peer does not send one.
        reminder: due_date.is_some(),
        reminder_time: due_date,
        repeating: false,
        deleted: false,
        title_updated_at,
        notes_updated_at,
        completed_updated_at,
        updated_at: title_updated_at
            .max(notes_updated_at)
            .max(completed_updated_at),
        synced_at: now,
        dirty: false,
    }
}
