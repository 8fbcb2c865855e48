//! Process wiring.
//!
//! [`bootstrap`] builds the process-wide singletons (store, core, pump,
//! router, maintenance) from a configuration and hands back an
//! [`Engine`] handle. There is no global mutable state; everything hangs
//! off the returned handle.

use crate::alarm::AlarmScheduler;
use crate::clock::{now_ms, random_nonce};
use crate::config::SyncConfig;
use crate::core::SyncCore;
use crate::error::EngineResult;
use crate::maintenance::{spawn_maintenance_task, Maintenance};
use crate::pump::OutboxPump;
use crate::router::InboxRouter;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::watch;
use wearsync_core::{PathScheme, SyncStatus};
use wearsync_store::{Store, TaskFeed};
use wearsync_types::SyncRequest;

/// Handle to a running sync engine.
pub struct Engine {
    store: Store,
    core: Arc<SyncCore>,
    pump: Arc<OutboxPump>,
    router: Arc<InboxRouter>,
    maintenance: Arc<Maintenance>,
    maintenance_task: tokio::task::JoinHandle<()>,
    transport: Arc<dyn Transport>,
    scheme: PathScheme,
}

impl Engine {
    /// The mutation and inbound-apply API.
    pub fn core(&self) -> &Arc<SyncCore> {
        &self.core
    }

    /// The bus event entry point; hook this to the transport callback.
    pub fn router(&self) -> &Arc<InboxRouter> {
        &self.router
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Observe the coarse sync status.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.pump.status()
    }

    /// Observe the active task list.
    pub fn task_feed(&self) -> TaskFeed {
        self.store.task_feed()
    }

    /// Drain the outbox now instead of waiting for the next tick.
    pub async fn drain_outbox(&self) -> EngineResult<()> {
        self.pump.drain().await?;
        Ok(())
    }

    /// Run a full maintenance pass now ("sync now").
    pub async fn sync_now(&self) -> EngineResult<()> {
        self.maintenance.run_tick().await
    }

    /// Ask the peer for a fresh snapshot.
    ///
    /// The nonce keeps repeated requests distinct so the bus cannot
    /// deduplicate them away.
    pub async fn request_sync(&self) -> EngineResult<()> {
        let request = SyncRequest {
            timestamp: now_ms(),
            nonce: random_nonce(),
        };
        self.transport
            .put(self.scheme.sync_request_path(), &request.to_bytes()?, false)
            .await?;
        Ok(())
    }

    /// Stop the background maintenance task.
    pub fn shutdown(&self) {
        self.maintenance_task.abort();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.maintenance_task.abort();
    }
}

/// Build and start the engine.
pub async fn bootstrap(
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    alarms: Arc<dyn AlarmScheduler>,
) -> EngineResult<Engine> {
    let store = Store::open(&config.database).await?;
    bootstrap_with_store(config, store, transport, alarms).await
}

/// Build and start the engine on an existing store (tests use this with
/// the in-memory store).
pub async fn bootstrap_with_store(
    config: SyncConfig,
    store: Store,
    transport: Arc<dyn Transport>,
    alarms: Arc<dyn AlarmScheduler>,
) -> EngineResult<Engine> {
    let scheme = PathScheme::new(&config.peer_label_local, &config.peer_label_peer);

    let core = Arc::new(SyncCore::new(store.clone(), alarms.clone()));
    let pump = Arc::new(OutboxPump::new(
        store.clone(),
        transport.clone(),
        scheme.clone(),
        config.stuck_threshold_ms,
        config.max_send_attempts,
    ));
    let router = Arc::new(InboxRouter::new(
        core.clone(),
        transport.clone(),
        scheme.clone(),
    ));
    let maintenance = Arc::new(Maintenance::new(
        store.clone(),
        pump.clone(),
        alarms,
        &config,
    ));
    let maintenance_task =
        spawn_maintenance_task(maintenance.clone(), config.maintenance_interval_ms);

    tracing::info!(
        local = %config.peer_label_local,
        peer = %config.peer_label_peer,
        "sync engine started"
    );

    Ok(Engine {
        store,
        core,
        pump,
        router,
        maintenance,
        maintenance_task,
        transport,
        scheme,
    })
}
