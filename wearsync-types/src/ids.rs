//! Identity types for wearsync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable identifier for a task.
///
/// Generated as a UUID v4 by the peer that creates the task, but treated
/// as an opaque string thereafter: ids minted by the remote peer are
/// accepted verbatim.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random TaskId (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

/// An identifier assigned by the remote peer for cross-peer record linking.
///
/// The remote peer keys its own task rows by a numeric id; once a local
/// task has been observed by the peer, the peer id is bound to the local
/// row and is unique among bound rows.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(u64);

impl PeerId {
    /// Wrap a raw peer-assigned id.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

/// A locally-assigned outbox operation id.
///
/// Monotonically increasing, assigned by the store on outbox insertion.
/// Appears on the bus as its decimal rendering. Remote operation ids are
/// opaque strings and are not represented by this type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct OpId(u64);

impl OpId {
    /// Wrap a raw op id.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_generate_is_uuid() {
        let id = TaskId::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn task_id_accepts_opaque_strings() {
        let id = TaskId::from("peer-row-17");
        assert_eq!(id.as_str(), "peer-row-17");
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::generate(), TaskId::generate());
    }

    #[test]
    fn op_id_ordering() {
        assert!(OpId::new(1) < OpId::new(2));
    }

    #[test]
    fn op_id_display_is_decimal() {
        assert_eq!(OpId::new(42).to_string(), "42");
    }

    #[test]
    fn peer_id_roundtrip() {
        let peer = PeerId::new(7);
        assert_eq!(peer.value(), 7);
        assert_eq!(peer.to_string(), "7");
    }
}
