//! Coarse sync status surfaced to the UI.

use std::fmt;

/// Observable sync state.
///
/// Per-operation errors never reach the UI; they are recorded on the
/// outbox rows. This is the only signal the UI sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing in flight and no failed operations.
    #[default]
    Idle,
    /// A drain is in progress.
    Syncing,
    /// At least one operation has permanently failed.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("idle"),
            SyncStatus::Syncing => f.write_str("syncing"),
            SyncStatus::Error => f.write_str("error"),
        }
    }
}
