//! Configuration loading for the sync engine.
//!
//! Configuration is loaded from a TOML file (default: `wearsync.toml`).

use serde::Deserialize;
use std::path::PathBuf;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Time before a `SENDING` outbox entry is reset (default: 5 min).
    #[serde(default = "default_stuck_threshold_ms")]
    pub stuck_threshold_ms: i64,
    /// Maintenance tick interval (default: 15 min).
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
    /// Retention of the idempotency log (default: 7 days).
    #[serde(default = "default_processed_op_ttl_ms")]
    pub processed_op_ttl_ms: i64,
    /// Retention of synced tombstones (default: 30 days).
    #[serde(default = "default_tombstone_ttl_ms")]
    pub tombstone_ttl_ms: i64,
    /// Send attempts before an outbox entry is marked FAILED (default: 10).
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: i64,
    /// Our role label in bus paths (default: "watch").
    #[serde(default = "default_peer_label_local")]
    pub peer_label_local: String,
    /// The remote peer's role label in bus paths (default: "phone").
    #[serde(default = "default_peer_label_peer")]
    pub peer_label_peer: String,
}

// Default value functions
fn default_database() -> PathBuf {
    PathBuf::from("wearsync.db")
}

fn default_stuck_threshold_ms() -> i64 {
    5 * 60 * 1000
}

fn default_maintenance_interval_ms() -> u64 {
    15 * 60 * 1000
}

fn default_processed_op_ttl_ms() -> i64 {
    7 * 24 * 60 * 60 * 1000
}

fn default_tombstone_ttl_ms() -> i64 {
    30 * 24 * 60 * 60 * 1000
}

fn default_max_send_attempts() -> i64 {
    10
}

fn default_peer_label_local() -> String {
    "watch".to_string()
}

fn default_peer_label_peer() -> String {
    "phone".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            stuck_threshold_ms: default_stuck_threshold_ms(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
            processed_op_ttl_ms: default_processed_op_ttl_ms(),
            tombstone_ttl_ms: default_tombstone_ttl_ms(),
            max_send_attempts: default_max_send_attempts(),
            peer_label_local: default_peer_label_local(),
            peer_label_peer: default_peer_label_peer(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
