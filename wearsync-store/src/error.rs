//! Store error types.

use std::path::PathBuf;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted discriminator failed to parse.
    #[error("corrupt row: {0}")]
    Corrupt(#[from] wearsync_types::SyncError),

    /// Invalid database path.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
    },
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
