//! Bus path routing.
//!
//! The data bus addresses entries by path. The scheme is fixed for
//! interop with the peer:
//!
//! | Pattern | Direction | Meaning |
//! |---------|-----------|---------|
//! | `/outbox/<local>/<opId>` | local → peer | queued local op |
//! | `/ack/<local>/<opId>` | peer → local | ack for a local op |
//! | `/outbox/<peer>/<opId>` | peer → local | queued peer op |
//! | `/ack/<peer>/<opId>` | local → peer | ack for a peer op |
//! | `/snapshot/tasks` | peer → local | full task list |
//! | `/tasks/<taskId>` | peer → local | single task update |
//! | `/sync/request` | local → peer | snapshot request |
//!
//! `<local>` and `<peer>` are the configured role labels (by default
//! `watch` and `phone`).

use wearsync_types::{OpId, TaskId};

/// An inbound bus event, classified by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Ack for one of our outbox entries: `/ack/<local>/<opId>`.
    LocalAck {
        /// Our outbox op id, parsed from the decimal path segment.
        op_id: OpId,
    },
    /// A queued operation from the peer: `/outbox/<peer>/<opId>`.
    PeerOp {
        /// The peer's opaque op id.
        op_id: String,
    },
    /// A single incremental task update: `/tasks/<taskId>`.
    TaskUpdate {
        /// The task the update concerns.
        task_id: TaskId,
    },
    /// A full task-list snapshot: `/snapshot/tasks`.
    Snapshot,
}

/// Path construction and parsing, parameterized by the two role labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScheme {
    local: String,
    peer: String,
}

impl PathScheme {
    /// Create a scheme for the given role labels.
    pub fn new(local: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            peer: peer.into(),
        }
    }

    /// Classify an inbound path. Returns `None` for paths this node does
    /// not consume (including our own outbound patterns echoed back).
    pub fn parse(&self, path: &str) -> Option<Route> {
        let mut parts = path.strip_prefix('/')?.splitn(3, '/');
        let head = parts.next()?;
        match (head, parts.next(), parts.next()) {
            ("ack", Some(label), Some(op_id)) if label == self.local => {
                let op_id = op_id.parse().ok()?;
                Some(Route::LocalAck {
                    op_id: OpId::new(op_id),
                })
            }
            ("outbox", Some(label), Some(op_id)) if label == self.peer => Some(Route::PeerOp {
                op_id: op_id.to_string(),
            }),
            ("tasks", Some(task_id), None) => Some(Route::TaskUpdate {
                task_id: TaskId::from(task_id),
            }),
            ("snapshot", Some("tasks"), None) => Some(Route::Snapshot),
            _ => None,
        }
    }

    /// Path for one of our queued operations.
    pub fn outbox_path(&self, op_id: OpId) -> String {
        format!("/outbox/{}/{}", self.local, op_id)
    }

    /// Path our acks for a local op arrive at (used for bus cleanup).
    pub fn local_ack_path(&self, op_id: OpId) -> String {
        format!("/ack/{}/{}", self.local, op_id)
    }

    /// Path for our ack of a peer op.
    pub fn peer_ack_path(&self, op_id: &str) -> String {
        format!("/ack/{}/{}", self.peer, op_id)
    }

    /// Path for a snapshot request.
    pub fn sync_request_path(&self) -> &'static str {
        "/sync/request"
    }
}
