//! SyncCore - transactional heart of the engine.
//!
//! Every local mutation writes the task table *and* enqueues exactly one
//! outbox entry inside a single store transaction, so a crash can never
//! separate the two. Every inbound operation runs through the pure merge
//! from `wearsync-core` inside one transaction guarded by the
//! idempotency log.

use crate::alarm::AlarmScheduler;
use crate::clock::now_ms;
use crate::error::{EngineError, EngineResult};
use std::sync::Arc;
use wearsync_core::{merge, MergeAction};
use wearsync_store::{outbox, processed, settings, tasks, Store, StoreError};
use wearsync_types::{
    NewTask, OpId, OpKind, Settings, SettingsDelta, Snapshot, Task, TaskDelta, TaskId,
};

/// Result of applying one inbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// At least one task write was performed.
    Applied,
    /// The op id was already in the idempotency log; nothing was touched.
    Duplicate,
    /// The merge produced no writes (older or tied timestamps, or a
    /// tombstone blocked the delta). Still recorded as processed.
    Ignored,
}

/// The transactional sync core.
///
/// One instance exists per process; clones share the store handle.
pub struct SyncCore {
    store: Store,
    alarms: Arc<dyn AlarmScheduler>,
}

impl SyncCore {
    /// Create the core around a store and the alarm collaborator.
    pub fn new(store: Store, alarms: Arc<dyn AlarmScheduler>) -> Self {
        Self { store, alarms }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ------------------------------------------------------------------
    // Local mutations (UI edge)
    // ------------------------------------------------------------------

    /// Create a task and enqueue its CREATE operation.
    pub async fn create_task(&self, fields: NewTask) -> EngineResult<Task> {
        let now = now_ms();
        let task = Task::new_local(fields, now);
        let delta = creation_delta(&task, now);

        let mut tx = self.store.begin().await?;
        tasks::insert_or_replace(&mut tx, &task).await?;
        outbox::insert(&mut tx, &task.id, OpKind::Create, &delta.to_bytes()?, now).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.store.notify_tasks_changed();

        if task.reminder {
            self.alarms.schedule(&task).await;
        }
        Ok(task)
    }

    /// Edit the title.
    pub async fn update_title(&self, id: &TaskId, title: &str) -> EngineResult<()> {
        let now = now_ms();
        let delta = TaskDelta {
            title: Some(title.to_string()),
            title_updated_at: Some(now),
            ..TaskDelta::default()
        };

        let mut tx = self.store.begin().await?;
        let rows = tasks::write_title(&mut tx, id, title, now).await?;
        if rows == 0 {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        outbox::insert(&mut tx, id, OpKind::Update, &delta.to_bytes()?, now).await?;
        let task = tasks::get(&mut tx, id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.after_mutation(task).await;
        Ok(())
    }

    /// Edit the notes. An empty value clears them on both peers.
    pub async fn update_notes(&self, id: &TaskId, notes: Option<String>) -> EngineResult<()> {
        let now = now_ms();
        let delta = TaskDelta {
            notes: Some(notes.clone().unwrap_or_default()),
            notes_updated_at: Some(now),
            ..TaskDelta::default()
        };

        let mut tx = self.store.begin().await?;
        let rows = tasks::write_notes(&mut tx, id, notes.as_deref(), now).await?;
        if rows == 0 {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        outbox::insert(&mut tx, id, OpKind::Update, &delta.to_bytes()?, now).await?;
        let task = tasks::get(&mut tx, id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.after_mutation(task).await;
        Ok(())
    }

    /// Edit title and notes together; still exactly one outbox entry.
    pub async fn update_title_and_notes(
        &self,
        id: &TaskId,
        title: &str,
        notes: Option<String>,
    ) -> EngineResult<()> {
        let now = now_ms();
        let delta = TaskDelta {
            title: Some(title.to_string()),
            title_updated_at: Some(now),
            notes: Some(notes.clone().unwrap_or_default()),
            notes_updated_at: Some(now),
            ..TaskDelta::default()
        };

        let mut tx = self.store.begin().await?;
        let rows = tasks::write_title(&mut tx, id, title, now).await?;
        if rows == 0 {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        tasks::write_notes(&mut tx, id, notes.as_deref(), now).await?;
        outbox::insert(&mut tx, id, OpKind::Update, &delta.to_bytes()?, now).await?;
        let task = tasks::get(&mut tx, id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.after_mutation(task).await;
        Ok(())
    }

    /// Flip the completion flag.
    pub async fn set_completed(&self, id: &TaskId, completed: bool) -> EngineResult<()> {
        let now = now_ms();
        let delta = TaskDelta {
            completed: Some(completed),
            completed_updated_at: Some(now),
            ..TaskDelta::default()
        };

        let mut tx = self.store.begin().await?;
        let rows = tasks::write_completed(&mut tx, id, completed, now).await?;
        if rows == 0 {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        outbox::insert(&mut tx, id, OpKind::Complete, &delta.to_bytes()?, now).await?;
        let task = tasks::get(&mut tx, id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.after_mutation(task).await;
        Ok(())
    }

    /// Edit the schedule fields.
    ///
    /// Only the due date travels to the peer; due time and reminder
    /// settings are local concerns.
    pub async fn update_schedule(
        &self,
        id: &TaskId,
        due_date: Option<i64>,
        due_time: Option<i64>,
        reminder: bool,
        reminder_time: Option<i64>,
    ) -> EngineResult<()> {
        let now = now_ms();
        let delta = TaskDelta {
            due_date: Some(due_date.unwrap_or(0)),
            ..TaskDelta::default()
        };

        let mut tx = self.store.begin().await?;
        let rows =
            tasks::write_schedule(&mut tx, id, due_date, due_time, reminder, reminder_time, now)
                .await?;
        if rows == 0 {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        outbox::insert(&mut tx, id, OpKind::Update, &delta.to_bytes()?, now).await?;
        let task = tasks::get(&mut tx, id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.after_mutation(task).await;
        Ok(())
    }

    /// Soft-delete a task; the tombstone stays until the peer acks and
    /// maintenance ages it out.
    pub async fn delete_task(&self, id: &TaskId) -> EngineResult<()> {
        let now = now_ms();
        let delta = TaskDelta {
            deleted: Some(true),
            ..TaskDelta::default()
        };

        let mut tx = self.store.begin().await?;
        let rows = tasks::write_deleted(&mut tx, id, now).await?;
        if rows == 0 {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        outbox::insert(&mut tx, id, OpKind::Delete, &delta.to_bytes()?, now).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.store.notify_tasks_changed();

        self.alarms.cancel(id).await;
        Ok(())
    }

    /// Post-commit side effects shared by the mutation methods: bump the
    /// task revision and keep the alarm collaborator in step. Completing,
    /// deleting, or disarming the reminder drops the alarm; a live
    /// reminder is (re)armed. Both calls are idempotent on the
    /// collaborator side.
    async fn after_mutation(&self, task: Option<Task>) {
        self.store.notify_tasks_changed();
        if let Some(task) = task {
            if task.reminder && !task.completed && !task.deleted {
                self.alarms.schedule(&task).await;
            } else {
                self.alarms.cancel(&task.id).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound (router edge)
    // ------------------------------------------------------------------

    /// Apply one inbound operation, idempotent in `op_id`.
    pub async fn apply_inbound(
        &self,
        op_id: &str,
        task_id: &TaskId,
        delta: &TaskDelta,
    ) -> EngineResult<ApplyOutcome> {
        let now = now_ms();
        let mut tx = self.store.begin().await?;

        if processed::is_processed(&mut tx, op_id).await? {
            return Ok(ApplyOutcome::Duplicate);
        }

        let (outcome, tombstoned) = apply_merge(&mut tx, task_id, delta, now).await?;
        processed::mark_processed(&mut tx, op_id, now).await?;
        tx.commit().await.map_err(StoreError::from)?;

        if outcome == ApplyOutcome::Applied {
            self.store.notify_tasks_changed();
        }
        if let Some(id) = tombstoned {
            self.alarms.cancel(&id).await;
        }
        Ok(outcome)
    }

    /// Apply a full snapshot from the peer.
    ///
    /// Each element runs through the merge in its own transaction with a
    /// deterministic op id. The processed-op check is bypassed so
    /// re-delivered snapshots are re-merged (a no-op on equal
    /// timestamps), but processing is still recorded.
    pub async fn apply_snapshot(&self, snapshot: &Snapshot) -> EngineResult<usize> {
        let now = now_ms();
        let mut applied = 0;
        let mut wrote_any = false;
        let mut tombstoned = Vec::new();

        for element in &snapshot.tasks {
            let op_id = element.op_id();
            let delta = element.to_delta();

            let mut tx = self.store.begin().await?;
            let (outcome, tomb) = apply_merge(&mut tx, &element.id, &delta, now).await?;
            processed::mark_processed(&mut tx, &op_id, now).await?;
            tx.commit().await.map_err(StoreError::from)?;

            if outcome == ApplyOutcome::Applied {
                applied += 1;
                wrote_any = true;
            }
            if let Some(id) = tomb {
                tombstoned.push(id);
            }
        }

        if wrote_any {
            self.store.notify_tasks_changed();
        }
        for id in tombstoned {
            self.alarms.cancel(&id).await;
        }
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Outbox state transitions (pump and router edges)
    // ------------------------------------------------------------------

    /// The peer acknowledged one of our operations.
    pub async fn mark_acked(&self, op_id: OpId) -> EngineResult<()> {
        let now = now_ms();
        let mut tx = self.store.begin().await?;
        let Some(entry) = outbox::get(&mut tx, op_id).await? else {
            tracing::debug!(%op_id, "ack for unknown outbox entry, ignoring");
            return Ok(());
        };
        outbox::mark_acked(&mut tx, op_id).await?;
        tasks::mark_synced(&mut tx, &entry.task_id, now).await?;
        tx.commit().await.map_err(StoreError::from)?;
        self.store.notify_tasks_changed();
        Ok(())
    }

    /// The peer rejected one of our operations; park it as FAILED.
    pub async fn mark_op_failed(&self, op_id: OpId, error: &str) -> EngineResult<()> {
        let mut tx = self.store.begin().await?;
        outbox::mark_failed(&mut tx, op_id, error).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Apply a local settings edit.
    pub async fn update_settings(&self, delta: &SettingsDelta) -> EngineResult<Settings> {
        let mut tx = self.store.begin().await?;
        let updated = settings::update_local(&mut tx, delta).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(updated)
    }

    /// Apply the peer's settings. Only writes when the local row has no
    /// unsent changes; returns whether anything was applied.
    pub async fn apply_peer_settings(&self, incoming: &Settings) -> EngineResult<bool> {
        let now = now_ms();
        let mut tx = self.store.begin().await?;
        let applied = settings::apply_peer(&mut tx, incoming, now).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current active task list.
    pub async fn active_tasks(&self) -> EngineResult<Vec<Task>> {
        let mut conn = self.store.acquire().await?;
        Ok(tasks::list_active(&mut conn).await?)
    }

    /// Fetch a single task, tombstones included.
    pub async fn get_task(&self, id: &TaskId) -> EngineResult<Option<Task>> {
        let mut conn = self.store.acquire().await?;
        Ok(tasks::get(&mut conn, id).await?)
    }
}

/// Resolve the local counterpart of an inbound delta and execute the
/// merge actions. Returns the outcome and, when a tombstone was written,
/// the id whose alarm should be cancelled after commit.
async fn apply_merge(
    tx: &mut sqlx::SqliteConnection,
    task_id: &TaskId,
    delta: &TaskDelta,
    now: i64,
) -> EngineResult<(ApplyOutcome, Option<TaskId>)> {
    // Duplicate reconciliation: id, then peer id, then a dirty unlinked
    // task with the same title (a local create racing the peer snapshot).
    let mut local = tasks::get(&mut *tx, task_id).await?;
    if local.is_none() {
        if let Some(peer_id) = delta.peer_id {
            local = tasks::get_by_peer_id(&mut *tx, peer_id).await?;
        }
    }
    if local.is_none() {
        if let Some(title) = &delta.title {
            local = tasks::find_dirty_by_title_unlinked(&mut *tx, title).await?;
        }
    }

    let resolved_id = local
        .as_ref()
        .map(|task| task.id.clone())
        .unwrap_or_else(|| task_id.clone());

    let actions = merge(local.as_ref(), &resolved_id, delta, now);
    if actions.is_empty() {
        return Ok((ApplyOutcome::Ignored, None));
    }

    let mut tombstoned = None;
    for action in &actions {
        match action {
            MergeAction::Tombstone { at } => {
                tasks::tombstone(&mut *tx, &resolved_id, *at).await?;
                tombstoned = Some(resolved_id.clone());
            }
            MergeAction::Insert(task) => {
                tasks::insert_or_replace(&mut *tx, task).await?;
            }
            MergeAction::SetTitleIfNewer { title, ts } => {
                tasks::update_title_if_newer(&mut *tx, &resolved_id, title, *ts).await?;
            }
            MergeAction::SetNotesIfNewer { notes, ts } => {
                tasks::update_notes_if_newer(&mut *tx, &resolved_id, notes.as_deref(), *ts)
                    .await?;
            }
            MergeAction::SetCompletedIfNewer { completed, ts } => {
                tasks::update_completed_if_newer(&mut *tx, &resolved_id, *completed, *ts).await?;
            }
            MergeAction::SetPeerId(peer_id) => {
                tasks::set_peer_id(&mut *tx, &resolved_id, *peer_id).await?;
            }
            MergeAction::SetDueDate(due_date) => {
                tasks::set_due_date(&mut *tx, &resolved_id, *due_date, now).await?;
            }
            MergeAction::MarkSynced { at } => {
                tasks::mark_merged(&mut *tx, &resolved_id, *at).await?;
            }
        }
    }

    Ok((ApplyOutcome::Applied, tombstoned))
}

/// The CREATE payload: the full content the peer needs to materialize
/// the task, nothing more.
fn creation_delta(task: &Task, now: i64) -> TaskDelta {
    TaskDelta {
        title: Some(task.title.clone()),
        title_updated_at: Some(now),
        notes: task.notes.clone(),
        notes_updated_at: task.notes.as_ref().map(|_| now),
        completed: None,
        completed_updated_at: None,
        deleted: None,
        priority: (task.priority != 0).then_some(task.priority),
        due_date: task.due_date,
        peer_id: None,
    }
}
