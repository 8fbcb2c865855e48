//! Outbox data model.
//!
//! Outbox rows are the durable FIFO queue of local operations awaiting
//! delivery and acknowledgment. The transition rules live in
//! `wearsync-core`; this module only defines the data shapes shared by
//! the store and the engine.

use crate::{OpId, SyncError, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a queued local operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpKind {
    /// A new task was created locally.
    Create,
    /// One or more content fields changed.
    Update,
    /// The task was soft-deleted locally.
    Delete,
    /// The completion flag changed.
    Complete,
}

impl OpKind {
    /// Wire rendering, e.g. `"CREATE"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "CREATE",
            OpKind::Update => "UPDATE",
            OpKind::Delete => "DELETE",
            OpKind::Complete => "COMPLETE",
        }
    }

    /// Parse the wire rendering.
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "CREATE" => Ok(OpKind::Create),
            "UPDATE" => Ok(OpKind::Update),
            "DELETE" => Ok(OpKind::Delete),
            "COMPLETE" => Ok(OpKind::Complete),
            other => Err(SyncError::InvalidOpKind(other.to_string())),
        }
    }

    /// Whether this operation requests urgent bus delivery.
    ///
    /// All four task operations are user-visible edits and go out urgent;
    /// batch and maintenance traffic does not.
    pub fn is_urgent(&self) -> bool {
        matches!(
            self,
            OpKind::Create | OpKind::Update | OpKind::Delete | OpKind::Complete
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxState {
    /// Queued, not yet handed to the bus.
    Pending,
    /// A bus put is in flight.
    Sending,
    /// The bus accepted the put; awaiting the peer's ack.
    Sent,
    /// The peer acknowledged the operation.
    Acked,
    /// Gave up; excluded from draining until operator intervention.
    Failed,
}

impl OutboxState {
    /// Storage rendering, e.g. `"PENDING"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxState::Pending => "PENDING",
            OutboxState::Sending => "SENDING",
            OutboxState::Sent => "SENT",
            OutboxState::Acked => "ACKED",
            OutboxState::Failed => "FAILED",
        }
    }

    /// Parse the storage rendering.
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "PENDING" => Ok(OutboxState::Pending),
            "SENDING" => Ok(OutboxState::Sending),
            "SENT" => Ok(OutboxState::Sent),
            "ACKED" => Ok(OutboxState::Acked),
            "FAILED" => Ok(OutboxState::Failed),
            other => Err(SyncError::InvalidOutboxState(other.to_string())),
        }
    }
}

impl fmt::Display for OutboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Locally-assigned monotonic op id.
    pub op_id: OpId,
    /// The task this operation concerns.
    pub task_id: TaskId,
    /// Operation kind.
    pub kind: OpKind,
    /// Serialized field delta for the peer.
    pub payload: Vec<u8>,
    /// When the operation was enqueued (ms since epoch).
    pub created_at: i64,
    /// Number of send attempts so far.
    pub attempts: i64,
    /// Current delivery state.
    pub state: OutboxState,
    /// When the last send attempt started.
    pub last_attempt_at: Option<i64>,
    /// Message of the most recent send failure.
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_kind_roundtrip() {
        for kind in [OpKind::Create, OpKind::Update, OpKind::Delete, OpKind::Complete] {
            assert_eq!(OpKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn op_kind_rejects_unknown() {
        assert!(OpKind::parse("RENAME").is_err());
    }

    #[test]
    fn task_ops_are_urgent() {
        assert!(OpKind::Create.is_urgent());
        assert!(OpKind::Update.is_urgent());
        assert!(OpKind::Delete.is_urgent());
        assert!(OpKind::Complete.is_urgent());
    }

    #[test]
    fn outbox_state_roundtrip() {
        for state in [
            OutboxState::Pending,
            OutboxState::Sending,
            OutboxState::Sent,
            OutboxState::Acked,
            OutboxState::Failed,
        ] {
            assert_eq!(OutboxState::parse(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn outbox_state_rejects_unknown() {
        assert!(OutboxState::parse("pending").is_err());
    }
}
