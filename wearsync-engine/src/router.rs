//! Inbox router: demultiplexes bus events into SyncCore calls.
//!
//! The transport may reuse the event buffer as soon as the callback
//! returns, so everything is copied into owned memory before the first
//! await. Malformed payloads are logged and dropped without an ack; the
//! bus is at-least-once, so the peer will redeliver.

use crate::clock::now_ms;
use crate::core::SyncCore;
use crate::error::EngineResult;
use crate::transport::Transport;
use std::sync::Arc;
use wearsync_core::{PathScheme, Route};
use wearsync_types::{AckFields, AckPayload, InboundOp, Snapshot};

/// The two bus event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEventKind {
    /// An entry was created or updated.
    Changed,
    /// An entry was removed.
    Deleted,
}

/// Dispatcher from bus events to the sync core.
pub struct InboxRouter {
    core: Arc<SyncCore>,
    transport: Arc<dyn Transport>,
    scheme: PathScheme,
}

impl InboxRouter {
    /// Create a router.
    pub fn new(core: Arc<SyncCore>, transport: Arc<dyn Transport>, scheme: PathScheme) -> Self {
        Self {
            core,
            transport,
            scheme,
        }
    }

    /// Handle one bus event.
    ///
    /// `payload` is only valid for the duration of this call; it is
    /// copied before any suspension point.
    pub async fn on_event(
        &self,
        kind: BusEventKind,
        path: &str,
        payload: &[u8],
    ) -> EngineResult<()> {
        // Materialize before the first await: the bus owns these buffers.
        let path = path.to_string();
        let payload = payload.to_vec();

        if kind == BusEventKind::Deleted {
            tracing::debug!(%path, "ignoring bus deletion event");
            return Ok(());
        }

        match self.scheme.parse(&path) {
            Some(Route::LocalAck { op_id }) => {
                let fields = match AckFields::from_bytes(&payload) {
                    Ok(fields) => fields,
                    Err(e) => {
                        tracing::warn!(%path, error = %e, "dropping malformed ack");
                        return Ok(());
                    }
                };
                if fields.success {
                    self.core.mark_acked(op_id).await?;
                } else {
                    let error = fields.error.as_deref().unwrap_or("peer rejected operation");
                    self.core.mark_op_failed(op_id, error).await?;
                }
                // Consume the ack entry from the bus.
                if let Err(e) = self.transport.delete(&path).await {
                    tracing::warn!(%path, error = %e, "failed to clean up ack entry");
                }
                Ok(())
            }
            Some(Route::PeerOp { op_id }) => {
                let op = match InboundOp::from_bytes(&payload) {
                    Ok(op) => op,
                    Err(e) => {
                        tracing::warn!(%path, error = %e, "dropping malformed peer op");
                        return Ok(());
                    }
                };
                let Some(task_id) = op.task_id.clone() else {
                    tracing::warn!(%path, "dropping peer op without taskId");
                    return Ok(());
                };

                let (success, error) =
                    match self.core.apply_inbound(&op_id, &task_id, &op.delta).await {
                        Ok(_) => (true, None),
                        Err(e) => {
                            tracing::error!(%op_id, error = %e, "inbound apply failed");
                            (false, Some(e.to_string()))
                        }
                    };

                let ack = AckPayload {
                    op_id: op_id.clone(),
                    success,
                    error,
                    timestamp: now_ms(),
                };
                let ack_path = self.scheme.peer_ack_path(&op_id);
                self.transport
                    .put(&ack_path, &ack.to_bytes()?, false)
                    .await?;
                Ok(())
            }
            Some(Route::TaskUpdate { task_id }) => {
                let op = match InboundOp::from_bytes(&payload) {
                    Ok(op) => op,
                    Err(e) => {
                        tracing::warn!(%path, error = %e, "dropping malformed task update");
                        return Ok(());
                    }
                };
                let Some(timestamp) = op.timestamp else {
                    tracing::warn!(%path, "dropping task update without timestamp");
                    return Ok(());
                };
                let op_id = format!("task:{task_id}:{timestamp}");
                self.core.apply_inbound(&op_id, &task_id, &op.delta).await?;
                Ok(())
            }
            Some(Route::Snapshot) => {
                let snapshot = match Snapshot::from_bytes(&payload) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed snapshot");
                        return Ok(());
                    }
                };
                let applied = self.core.apply_snapshot(&snapshot).await?;
                tracing::info!(
                    tasks = snapshot.tasks.len(),
                    applied,
                    "applied snapshot"
                );
                Ok(())
            }
            None => {
                tracing::debug!(%path, "unrouted bus event");
                Ok(())
            }
        }
    }
}
