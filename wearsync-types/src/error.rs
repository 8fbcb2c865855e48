//! Error types for wearsync.

use thiserror::Error;

/// Errors that can occur in wearsync protocol handling.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Payload parsed but required fields are missing or ill-typed
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Unknown operation kind discriminator
    #[error("invalid op kind: {0}")]
    InvalidOpKind(String),

    /// Unknown outbox state discriminator
    #[error("invalid outbox state: {0}")]
    InvalidOutboxState(String),

    /// Bus path does not match any known pattern
    #[error("unroutable path: {0}")]
    UnroutablePath(String),
}
