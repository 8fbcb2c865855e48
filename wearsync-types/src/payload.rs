//! Bus payload types.
//!
//! Payloads on the data bus are KV maps with string keys, exchanged as
//! JSON objects. Key names are fixed by the wire protocol (`opId`,
//! `titleUpdatedAt`, `task_<i>_phoneId`, ...) and must not change.
//!
//! The snapshot payload flattens a task list into indexed keys
//! (`taskCount`, `task_0_id`, `task_0_title`, ...), so it gets a
//! hand-rolled codec over [`serde_json::Map`] instead of a derive.

use crate::{OpId, OpKind, PeerId, SyncError, TaskDelta, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A queued local operation as put on the bus at `/outbox/<local>/<opId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpEnvelope {
    /// Locally-assigned op id (decimal on the wire).
    pub op_id: OpId,
    /// The task the operation concerns.
    pub task_id: TaskId,
    /// Operation kind.
    pub op_type: OpKind,
    /// When the operation was enqueued (ms since epoch).
    pub timestamp: i64,
    /// The field delta for the peer.
    #[serde(flatten)]
    pub delta: TaskDelta,
}

impl OpEnvelope {
    /// Serialize to bus payload bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from bus payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}

/// An inbound operation payload.
///
/// Routes carry part of the addressing in the path, so both identifying
/// fields are optional here: `/outbox/<peer>/<opId>` payloads must carry
/// `taskId`, and `/tasks/<taskId>` payloads must carry `timestamp`. The
/// router validates whichever one its route requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundOp {
    /// The task the operation concerns, when present in the payload.
    pub task_id: Option<TaskId>,
    /// Operation timestamp, when present in the payload.
    pub timestamp: Option<i64>,
    /// The field delta.
    #[serde(flatten)]
    pub delta: TaskDelta,
}

impl InboundOp {
    /// Deserialize from bus payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}

/// An acknowledgment emitted at `/ack/<peer>/<opId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    /// The acknowledged remote op id.
    pub op_id: String,
    /// Whether the operation applied.
    pub success: bool,
    /// Failure detail, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the ack was produced (ms since epoch).
    pub timestamp: i64,
}

impl AckPayload {
    /// Serialize to bus payload bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }
}

/// The fields read from an inbound ack at `/ack/<local>/<opId>`.
///
/// The op id comes from the path; the payload's `opId` key (which the
/// peer may render as a string or a number) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AckFields {
    /// Whether the peer applied the operation.
    pub success: bool,
    /// Failure detail from the peer.
    #[serde(default)]
    pub error: Option<String>,
}

impl AckFields {
    /// Deserialize from bus payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}

/// A snapshot-request payload put at `/sync/request`.
///
/// The nonce makes repeated requests distinct so bus-level deduplication
/// cannot suppress them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// When the request was made (ms since epoch).
    pub timestamp: i64,
    /// Random request discriminator.
    pub nonce: u64,
}

impl SyncRequest {
    /// Serialize to bus payload bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from bus payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}

/// One task inside a snapshot payload.
///
/// The peer's own row id travels as `phoneId` here, unlike the `peerId`
/// key used on incremental deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotTask {
    /// Stable task id.
    pub id: TaskId,
    /// Title, when present.
    pub title: Option<String>,
    /// Timestamp of the last title write.
    pub title_updated_at: Option<i64>,
    /// Notes, when present.
    pub notes: Option<String>,
    /// Timestamp of the last notes write.
    pub notes_updated_at: Option<i64>,
    /// Completion flag.
    pub completed: Option<bool>,
    /// Timestamp of the last completed write.
    pub completed_updated_at: Option<i64>,
    /// Tombstone marker.
    pub deleted: Option<bool>,
    /// Priority.
    pub priority: Option<i64>,
    /// The peer's row id for this task.
    pub phone_id: Option<u64>,
    /// Due date; `0` means unset.
    pub due_date: Option<i64>,
}

impl SnapshotTask {
    /// Deterministic op id for idempotency-log purposes.
    pub fn op_id(&self) -> String {
        format!("snapshot:{}:{}", self.id, self.phone_id.unwrap_or(0))
    }

    /// Convert into the delta form consumed by the merge engine.
    pub fn to_delta(&self) -> TaskDelta {
        TaskDelta {
            title: self.title.clone(),
            title_updated_at: self.title_updated_at,
            notes: self.notes.clone(),
            notes_updated_at: self.notes_updated_at,
            completed: self.completed,
            completed_updated_at: self.completed_updated_at,
            deleted: self.deleted,
            priority: self.priority,
            due_date: self.due_date,
            peer_id: self.phone_id.map(PeerId::new),
        }
    }
}

/// A full task-list snapshot from the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// When the peer produced the snapshot (ms since epoch).
    pub snapshot_timestamp: i64,
    /// The tasks, in peer order.
    pub tasks: Vec<SnapshotTask>,
}

impl Snapshot {
    /// Decode from the flat-keyed bus payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        let value: Value = serde_json::from_slice(bytes).map_err(SyncError::Deserialization)?;
        let map = value
            .as_object()
            .ok_or_else(|| SyncError::MalformedPayload("snapshot is not an object".into()))?;

        let task_count = map
            .get("taskCount")
            .and_then(Value::as_i64)
            .ok_or_else(|| SyncError::MalformedPayload("snapshot missing taskCount".into()))?;
        let snapshot_timestamp = map
            .get("snapshotTimestamp")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let mut tasks = Vec::with_capacity(task_count.max(0) as usize);
        for i in 0..task_count {
            let id = get_str(map, i, "id")?.ok_or_else(|| {
                SyncError::MalformedPayload(format!("snapshot task {i} missing id"))
            })?;
            tasks.push(SnapshotTask {
                id: TaskId::from(id),
                title: get_str(map, i, "title")?,
                title_updated_at: get_i64(map, i, "titleUpdatedAt"),
                notes: get_str(map, i, "notes")?,
                notes_updated_at: get_i64(map, i, "notesUpdatedAt"),
                completed: get_bool(map, i, "completed"),
                completed_updated_at: get_i64(map, i, "completedUpdatedAt"),
                deleted: get_bool(map, i, "deleted"),
                priority: get_i64(map, i, "priority"),
                phone_id: get_i64(map, i, "phoneId").map(|v| v as u64),
                due_date: get_i64(map, i, "dueDate"),
            });
        }

        Ok(Self {
            snapshot_timestamp,
            tasks,
        })
    }

    /// Encode to the flat-keyed bus payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        let mut map = Map::new();
        map.insert("taskCount".into(), Value::from(self.tasks.len() as i64));
        map.insert(
            "snapshotTimestamp".into(),
            Value::from(self.snapshot_timestamp),
        );
        for (i, task) in self.tasks.iter().enumerate() {
            let mut put = |field: &str, value: Value| {
                map.insert(format!("task_{i}_{field}"), value);
            };
            put("id", Value::from(task.id.as_str()));
            if let Some(v) = &task.title {
                put("title", Value::from(v.as_str()));
            }
            if let Some(v) = task.title_updated_at {
                put("titleUpdatedAt", Value::from(v));
            }
            if let Some(v) = &task.notes {
                put("notes", Value::from(v.as_str()));
            }
            if let Some(v) = task.notes_updated_at {
                put("notesUpdatedAt", Value::from(v));
            }
            if let Some(v) = task.completed {
                put("completed", Value::from(v));
            }
            if let Some(v) = task.completed_updated_at {
                put("completedUpdatedAt", Value::from(v));
            }
            if let Some(v) = task.deleted {
                put("deleted", Value::from(v));
            }
            if let Some(v) = task.priority {
                put("priority", Value::from(v));
            }
            if let Some(v) = task.phone_id {
                put("phoneId", Value::from(v));
            }
            if let Some(v) = task.due_date {
                put("dueDate", Value::from(v));
            }
        }
        serde_json::to_vec(&Value::Object(map)).map_err(SyncError::Serialization)
    }
}

fn get_str(map: &Map<String, Value>, i: i64, field: &str) -> Result<Option<String>, SyncError> {
    match map.get(&format!("task_{i}_{field}")) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SyncError::MalformedPayload(format!(
            "snapshot task {i} field {field} is not a string: {other}"
        ))),
    }
}

fn get_i64(map: &Map<String, Value>, i: i64, field: &str) -> Option<i64> {
    map.get(&format!("task_{i}_{field}")).and_then(Value::as_i64)
}

fn get_bool(map: &Map<String, Value>, i: i64, field: &str) -> Option<bool> {
    match map.get(&format!("task_{i}_{field}")) {
        Some(Value::Bool(b)) => Some(*b),
        // The peer also renders booleans as 0/1 integers.
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}
