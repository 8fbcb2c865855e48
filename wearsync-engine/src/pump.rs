//! Outbox pump: drains PENDING operations to the bus.
//!
//! The drain is single-flight across the process (a tokio `Mutex` guards
//! it) and strictly FIFO over the outbox table, which gives per-task
//! send ordering for free. No store connection is held across a bus put.

use crate::clock::now_ms;
use crate::error::EngineResult;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::watch;
use wearsync_core::{outbox as outbox_fsm, PathScheme, SyncStatus};
use wearsync_store::{outbox, Store};
use wearsync_types::{OpEnvelope, OutboxState, TaskDelta};

/// Counters from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Entries handed to the bus.
    pub sent: u64,
    /// Entries left for retry after a transient failure.
    pub retried: u64,
    /// Entries parked as FAILED.
    pub failed: u64,
}

/// Single-flight drainer of the outbox table.
pub struct OutboxPump {
    store: Store,
    transport: Arc<dyn Transport>,
    scheme: PathScheme,
    status: watch::Sender<SyncStatus>,
    drain_lock: tokio::sync::Mutex<()>,
    stuck_threshold_ms: i64,
    max_send_attempts: i64,
}

impl OutboxPump {
    /// Create a pump.
    pub fn new(
        store: Store,
        transport: Arc<dyn Transport>,
        scheme: PathScheme,
        stuck_threshold_ms: i64,
        max_send_attempts: i64,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            transport,
            scheme,
            status,
            drain_lock: tokio::sync::Mutex::new(()),
            stuck_threshold_ms,
            max_send_attempts,
        }
    }

    /// Subscribe to the coarse sync status.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Run one drain pass: reset stuck sends, then push every queued
    /// entry to the bus in FIFO order.
    ///
    /// A put failure records the error on the row and moves on; the
    /// entry retries next pass until its attempt budget is spent.
    pub async fn drain(&self) -> EngineResult<DrainStats> {
        let _single_flight = self.drain_lock.lock().await;
        self.status.send_replace(SyncStatus::Syncing);

        let result = self.drain_inner().await;

        let failed_total = {
            let mut conn = self.store.acquire().await?;
            outbox::count_failed(&mut conn).await?
        };
        self.status.send_replace(if failed_total > 0 {
            SyncStatus::Error
        } else {
            SyncStatus::Idle
        });

        result
    }

    async fn drain_inner(&self) -> EngineResult<DrainStats> {
        let now = now_ms();
        let entries = {
            let mut conn = self.store.acquire().await?;
            let reset = outbox::reset_stuck(&mut conn, now - self.stuck_threshold_ms).await?;
            if reset > 0 {
                tracing::info!(reset, "reset stuck outbox entries");
            }
            outbox::list_pending_in_order(&mut conn).await?
        };

        let mut stats = DrainStats::default();
        for entry in entries {
            let attempt_at = now_ms();
            {
                let mut conn = self.store.acquire().await?;
                outbox::mark_sending(&mut conn, entry.op_id, attempt_at).await?;
            }

            // A payload that no longer parses will never send; park it.
            let delta = match TaskDelta::from_bytes(&entry.payload) {
                Ok(delta) => delta,
                Err(e) => {
                    tracing::error!(op_id = %entry.op_id, error = %e, "unreadable outbox payload");
                    let mut conn = self.store.acquire().await?;
                    outbox::mark_failed(&mut conn, entry.op_id, &e.to_string()).await?;
                    stats.failed += 1;
                    continue;
                }
            };

            let envelope = OpEnvelope {
                op_id: entry.op_id,
                task_id: entry.task_id.clone(),
                op_type: entry.kind,
                timestamp: entry.created_at,
                delta,
            };
            let path = self.scheme.outbox_path(entry.op_id);
            let put = self
                .transport
                .put(&path, &envelope.to_bytes()?, entry.kind.is_urgent())
                .await;

            let mut conn = self.store.acquire().await?;
            match put {
                Ok(()) => {
                    outbox::mark_sent(&mut conn, entry.op_id).await?;
                    stats.sent += 1;
                }
                Err(e) => {
                    let attempts_exhausted = entry.attempts + 1 >= self.max_send_attempts;
                    let next = outbox_fsm::transition(
                        OutboxState::Sending,
                        &outbox_fsm::OutboxEvent::PutFailed { attempts_exhausted },
                    );
                    tracing::warn!(
                        op_id = %entry.op_id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        next_state = %next,
                        "outbox put failed"
                    );
                    match next {
                        OutboxState::Failed => {
                            outbox::mark_failed(&mut conn, entry.op_id, &e.to_string()).await?;
                            stats.failed += 1;
                        }
                        _ => {
                            outbox::mark_retry(&mut conn, entry.op_id, &e.to_string()).await?;
                            stats.retried += 1;
                        }
                    }
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wearsync_types::{OpKind, TaskId};

    fn delta_bytes() -> Vec<u8> {
        TaskDelta {
            title: Some("Milk".into()),
            title_updated_at: Some(10),
            ..TaskDelta::default()
        }
        .to_bytes()
        .unwrap()
    }

    async fn test_pump() -> (OutboxPump, MockPieces) {
        let store = Store::in_memory().await.unwrap();
        let transport = Arc::new(crate::transport::MockTransport::new());
        let pump = OutboxPump::new(
            store.clone(),
            transport.clone(),
            PathScheme::new("watch", "phone"),
            300_000,
            3,
        );
        (pump, MockPieces { store, transport })
    }

    struct MockPieces {
        store: Store,
        transport: Arc<crate::transport::MockTransport>,
    }

    #[tokio::test]
    async fn drain_sends_fifo_and_marks_sent() {
        let (pump, pieces) = test_pump().await;
        let task = TaskId::from("t");
        {
            let mut conn = pieces.store.acquire().await.unwrap();
            outbox::insert(&mut conn, &task, OpKind::Create, &delta_bytes(), 10)
                .await
                .unwrap();
            outbox::insert(&mut conn, &task, OpKind::Update, &delta_bytes(), 20)
                .await
                .unwrap();
        }

        let stats = pump.drain().await.unwrap();
        assert_eq!(stats.sent, 2);

        let puts = pieces.transport.puts();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[0].path, "/outbox/watch/1");
        assert_eq!(puts[1].path, "/outbox/watch/2");
        assert!(puts[0].urgent);

        let envelope = OpEnvelope::from_bytes(&puts[0].payload).unwrap();
        assert_eq!(envelope.op_type, OpKind::Create);
        assert_eq!(envelope.task_id, task);
        assert_eq!(envelope.timestamp, 10);

        let mut conn = pieces.store.acquire().await.unwrap();
        assert!(outbox::list_pending_in_order(&mut conn)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn put_failure_leaves_entry_for_retry() {
        let (pump, pieces) = test_pump().await;
        {
            let mut conn = pieces.store.acquire().await.unwrap();
            outbox::insert(
                &mut conn,
                &TaskId::from("t"),
                OpKind::Create,
                &delta_bytes(),
                10,
            )
            .await
            .unwrap();
        }
        pieces.transport.fail_next_put("bus unreachable");

        let stats = pump.drain().await.unwrap();
        assert_eq!(stats.retried, 1);

        let mut conn = pieces.store.acquire().await.unwrap();
        let entry = outbox::get(&mut conn, wearsync_types::OpId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.state, OutboxState::Pending);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.error_message.as_deref(), Some("put failed: bus unreachable"));
        drop(conn);

        // Next drain succeeds and increments attempts.
        let stats = pump.drain().await.unwrap();
        assert_eq!(stats.sent, 1);
        let mut conn = pieces.store.acquire().await.unwrap();
        let entry = outbox::get(&mut conn, wearsync_types::OpId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.state, OutboxState::Sent);
    }

    #[tokio::test]
    async fn attempts_ceiling_parks_entry_as_failed() {
        let (pump, pieces) = test_pump().await;
        {
            let mut conn = pieces.store.acquire().await.unwrap();
            outbox::insert(
                &mut conn,
                &TaskId::from("t"),
                OpKind::Create,
                &delta_bytes(),
                10,
            )
            .await
            .unwrap();
        }

        for _ in 0..3 {
            pieces.transport.fail_next_put("down");
            pump.drain().await.unwrap();
        }

        let mut conn = pieces.store.acquire().await.unwrap();
        let entry = outbox::get(&mut conn, wearsync_types::OpId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.state, OutboxState::Failed);
        assert_eq!(entry.attempts, 3);
        assert_eq!(*pump.status().borrow(), SyncStatus::Error);
        drop(conn);

        // FAILED entries are excluded from later drains.
        let stats = pump.drain().await.unwrap();
        assert_eq!(stats, DrainStats::default());
    }

    #[tokio::test]
    async fn stuck_entries_are_reset_and_resent() {
        let (pump, pieces) = test_pump().await;
        let op_id = {
            let mut conn = pieces.store.acquire().await.unwrap();
            let op_id = outbox::insert(
                &mut conn,
                &TaskId::from("t"),
                OpKind::Create,
                &delta_bytes(),
                10,
            )
            .await
            .unwrap();
            // Simulate a send that started long ago and never finished.
            outbox::mark_sending(&mut conn, op_id, now_ms() - 6 * 60 * 1000)
                .await
                .unwrap();
            op_id
        };

        let stats = pump.drain().await.unwrap();
        assert_eq!(stats.sent, 1);

        let mut conn = pieces.store.acquire().await.unwrap();
        let entry = outbox::get(&mut conn, op_id).await.unwrap().unwrap();
        assert_eq!(entry.state, OutboxState::Sent);
        assert_eq!(entry.attempts, 2);
    }

    #[tokio::test]
    async fn status_returns_to_idle_after_clean_drain() {
        let (pump, _pieces) = test_pump().await;
        pump.drain().await.unwrap();
        assert_eq!(*pump.status().borrow(), SyncStatus::Idle);
    }
}
