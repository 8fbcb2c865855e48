//! Engine error types.

use crate::config::ConfigError;
use crate::transport::TransportError;
use wearsync_store::StoreError;
use wearsync_types::{SyncError, TaskId};

/// Main error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Payload encoding/decoding error.
    #[error("payload error: {0}")]
    Payload(#[from] SyncError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The referenced task does not exist (or is tombstoned).
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
