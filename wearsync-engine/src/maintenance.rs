//! Periodic maintenance: cleanup, retry, and alarm rescheduling.
//!
//! Every step is idempotent, so a failed tick is simply retried on the
//! next interval and partial progress is fine.

use crate::alarm::AlarmScheduler;
use crate::clock::now_ms;
use crate::config::SyncConfig;
use crate::error::EngineResult;
use crate::pump::OutboxPump;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use wearsync_store::{outbox, processed, tasks, Store};

/// The periodic maintenance job.
pub struct Maintenance {
    store: Store,
    pump: Arc<OutboxPump>,
    alarms: Arc<dyn AlarmScheduler>,
    stuck_threshold_ms: i64,
    processed_op_ttl_ms: i64,
    tombstone_ttl_ms: i64,
}

impl Maintenance {
    /// Create the job from the engine configuration.
    pub fn new(
        store: Store,
        pump: Arc<OutboxPump>,
        alarms: Arc<dyn AlarmScheduler>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            pump,
            alarms,
            stuck_threshold_ms: config.stuck_threshold_ms,
            processed_op_ttl_ms: config.processed_op_ttl_ms,
            tombstone_ttl_ms: config.tombstone_ttl_ms,
        }
    }

    /// Run one maintenance tick.
    ///
    /// Order matters: stuck sends are reset before the drain so they go
    /// out in the same pass, and acked entries are purged after it.
    pub async fn run_tick(&self) -> EngineResult<()> {
        let now = now_ms();

        {
            let mut conn = self.store.acquire().await?;
            let reset = outbox::reset_stuck(&mut conn, now - self.stuck_threshold_ms).await?;
            if reset > 0 {
                tracing::info!(reset, "maintenance reset stuck sends");
            }
        }

        self.pump.drain().await?;

        {
            let mut conn = self.store.acquire().await?;

            let purged = outbox::delete_acked(&mut conn).await?;
            if purged > 0 {
                tracing::debug!(purged, "purged acked outbox entries");
            }

            let purged = processed::cleanup_old(&mut conn, now - self.processed_op_ttl_ms).await?;
            if purged > 0 {
                tracing::debug!(purged, "purged old processed ops");
            }

            let purged = tasks::cleanup_deleted(&mut conn, now - self.tombstone_ttl_ms).await?;
            if purged > 0 {
                tracing::info!(purged, "purged aged tombstones");
                self.store.notify_tasks_changed();
            }
        }

        self.reschedule_alarms(now).await?;
        Ok(())
    }

    /// Re-arm reminders for every live task whose next fire is still
    /// ahead. The alarm collaborator is idempotent, so re-arming an
    /// already armed reminder is harmless.
    async fn reschedule_alarms(&self, now: i64) -> EngineResult<()> {
        let candidates = {
            let mut conn = self.store.acquire().await?;
            tasks::list_with_reminders(&mut conn).await?
        };
        for task in candidates {
            if task.reminder_time.is_some_and(|t| t > now) {
                self.alarms.schedule(&task).await;
            }
        }
        Ok(())
    }
}

/// Spawn the periodic maintenance task.
///
/// Returns a handle that can be used to abort the task on shutdown.
pub fn spawn_maintenance_task(
    maintenance: Arc<Maintenance>,
    interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_ms, "maintenance task started");
        let mut timer = interval(Duration::from_millis(interval_ms.max(1)));
        // The first tick of a tokio interval fires immediately; skip it
        // so startup is not a surprise sync.
        timer.tick().await;

        loop {
            timer.tick().await;
            if let Err(e) = maintenance.run_tick().await {
                tracing::error!(error = %e, "maintenance tick failed");
            }
        }
    })
}
