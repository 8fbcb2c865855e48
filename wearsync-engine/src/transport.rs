//! Transport abstraction over the data bus.
//!
//! The bus is a byte-keyed KV store with store-and-forward delivery:
//! entries put at a path are delivered to the remote peer at least once,
//! eventually ordered, possibly duplicated. The engine treats it as an
//! opaque sink; inbound traffic arrives through the [`InboxRouter`]
//! callback, not through this trait.
//!
//! [`InboxRouter`]: crate::InboxRouter

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The put was not accepted by the bus.
    #[error("put failed: {0}")]
    PutFailed(String),

    /// The delete was not accepted by the bus.
    #[error("delete failed: {0}")]
    DeleteFailed(String),

    /// The bus is not reachable at all.
    #[error("bus disconnected")]
    Disconnected,
}

/// Outbound half of the data bus.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Put a payload at a path. `urgent` requests expedited delivery for
    /// user-visible edits; batch traffic leaves it unset.
    async fn put(&self, path: &str, payload: &[u8], urgent: bool) -> Result<(), TransportError>;

    /// Remove a bus entry (used to clean up consumed acks).
    async fn delete(&self, path: &str) -> Result<(), TransportError>;
}

/// A single recorded put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPut {
    /// Target path.
    pub path: String,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Urgency flag.
    pub urgent: bool,
}

/// Mock transport for testing.
///
/// Records puts and deletes for verification and supports scripted
/// failures.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    puts: Vec<RecordedPut>,
    deletes: Vec<String>,
    fail_next_puts: VecDeque<String>,
    fail_next_delete: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded puts, in order.
    pub fn puts(&self) -> Vec<RecordedPut> {
        self.inner.lock().unwrap().puts.clone()
    }

    /// All recorded puts to paths with the given prefix.
    pub fn puts_with_prefix(&self, prefix: &str) -> Vec<RecordedPut> {
        self.inner
            .lock()
            .unwrap()
            .puts
            .iter()
            .filter(|p| p.path.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// The most recent put, if any.
    pub fn last_put(&self) -> Option<RecordedPut> {
        self.inner.lock().unwrap().puts.last().cloned()
    }

    /// All recorded deletes, in order.
    pub fn deletes(&self) -> Vec<String> {
        self.inner.lock().unwrap().deletes.clone()
    }

    /// Cause the next `put()` to fail with the given error. Queued
    /// failures apply one per call, oldest first.
    pub fn fail_next_put(&self, error: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_next_puts
            .push_back(error.to_string());
    }

    /// Cause the next `delete()` to fail with the given error.
    pub fn fail_next_delete(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_delete = Some(error.to_string());
    }

    /// Clear all recorded traffic and scripted failures.
    pub fn reset(&self) {
        *self.inner.lock().unwrap() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn put(&self, path: &str, payload: &[u8], urgent: bool) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_puts.pop_front() {
            return Err(TransportError::PutFailed(error));
        }

        inner.puts.push(RecordedPut {
            path: path.to_string(),
            payload: payload.to_vec(),
            urgent,
        });
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_delete.take() {
            return Err(TransportError::DeleteFailed(error));
        }

        inner.deletes.push(path.to_string());
        Ok(())
    }
}
