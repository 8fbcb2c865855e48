//! Task table operations.
//!
//! The `update_*_if_newer` functions are the merge primitives: each is a
//! single conditional UPDATE whose predicate re-checks the per-field
//! timestamp atomically, so concurrent writers cannot interleave between
//! read and write. The `write_*` functions are the local-mutation side:
//! they bump the per-field timestamp to `now` and mark the row dirty.

use crate::StoreResult;
use sqlx::sqlite::SqliteConnection;
use wearsync_types::{PeerId, Task, TaskId};

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    peer_id: Option<i64>,
    title: String,
    notes: Option<String>,
    completed: i64,
    priority: i64,
    due_date: Option<i64>,
    due_time: Option<i64>,
    reminder: i64,
    reminder_time: Option<i64>,
    repeating: i64,
    deleted: i64,
    title_updated_at: i64,
    notes_updated_at: i64,
    completed_updated_at: i64,
    updated_at: i64,
    synced_at: i64,
    dirty: i64,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: TaskId::from(row.id),
            peer_id: row.peer_id.map(|v| PeerId::new(v as u64)),
            title: row.title,
            notes: row.notes,
            completed: row.completed != 0,
            priority: row.priority,
            due_date: row.due_date,
            due_time: row.due_time,
            reminder: row.reminder != 0,
            reminder_time: row.reminder_time,
            repeating: row.repeating != 0,
            deleted: row.deleted != 0,
            title_updated_at: row.title_updated_at,
            notes_updated_at: row.notes_updated_at,
            completed_updated_at: row.completed_updated_at,
            updated_at: row.updated_at,
            synced_at: row.synced_at,
            dirty: row.dirty != 0,
        }
    }
}

const SELECT_COLUMNS: &str = "id, peer_id, title, notes, completed, priority, due_date, \
     due_time, reminder, reminder_time, repeating, deleted, title_updated_at, \
     notes_updated_at, completed_updated_at, updated_at, synced_at, dirty";

/// Fetch a task by id, tombstones included.
pub async fn get(conn: &mut SqliteConnection, id: &TaskId) -> StoreResult<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks WHERE id = ?1"
    ))
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Task::from))
}

/// Fetch a task by its bound peer id.
pub async fn get_by_peer_id(
    conn: &mut SqliteConnection,
    peer_id: PeerId,
) -> StoreResult<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks WHERE peer_id = ?1"
    ))
    .bind(peer_id.value() as i64)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Task::from))
}

/// Find a dirty, unlinked task with the given title.
///
/// Resolves the duplicate race where a locally-created task shows up in a
/// peer snapshot before its CREATE op has been acked.
pub async fn find_dirty_by_title_unlinked(
    conn: &mut SqliteConnection,
    title: &str,
) -> StoreResult<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks \
         WHERE dirty = 1 AND peer_id IS NULL AND deleted = 0 AND title = ?1 \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(title)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Task::from))
}

/// All live (non-tombstone) tasks.
pub async fn list_active(conn: &mut SqliteConnection) -> StoreResult<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks WHERE deleted = 0 ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Task::from).collect())
}

/// All tasks with unacknowledged local changes, tombstones included.
pub async fn list_dirty(conn: &mut SqliteConnection) -> StoreResult<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks WHERE dirty = 1 ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Task::from).collect())
}

/// All live tasks with an armed reminder.
pub async fn list_with_reminders(conn: &mut SqliteConnection) -> StoreResult<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks \
         WHERE reminder = 1 AND completed = 0 AND deleted = 0 ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Task::from).collect())
}

/// Insert a task, replacing any existing row with the same id.
pub async fn insert_or_replace(conn: &mut SqliteConnection, task: &Task) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO tasks (
            id, peer_id, title, notes, completed, priority, due_date, due_time,
            reminder, reminder_time, repeating, deleted, title_updated_at,
            notes_updated_at, completed_updated_at, updated_at, synced_at, dirty
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
    )
    .bind(task.id.as_str())
    .bind(task.peer_id.map(|p| p.value() as i64))
    .bind(&task.title)
    .bind(&task.notes)
    .bind(task.completed as i64)
    .bind(task.priority)
    .bind(task.due_date)
    .bind(task.due_time)
    .bind(task.reminder as i64)
    .bind(task.reminder_time)
    .bind(task.repeating as i64)
    .bind(task.deleted as i64)
    .bind(task.title_updated_at)
    .bind(task.notes_updated_at)
    .bind(task.completed_updated_at)
    .bind(task.updated_at)
    .bind(task.synced_at)
    .bind(task.dirty as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write the title iff `ts` is strictly newer than the stored one.
///
/// Returns the number of rows affected (0 when the local value won).
pub async fn update_title_if_newer(
    conn: &mut SqliteConnection,
    id: &TaskId,
    title: &str,
    ts: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET title = ?2, title_updated_at = ?3, updated_at = MAX(updated_at, ?3)
        WHERE id = ?1 AND title_updated_at < ?3 AND deleted = 0
        "#,
    )
    .bind(id.as_str())
    .bind(title)
    .bind(ts)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Write the notes iff `ts` is strictly newer than the stored one.
pub async fn update_notes_if_newer(
    conn: &mut SqliteConnection,
    id: &TaskId,
    notes: Option<&str>,
    ts: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET notes = ?2, notes_updated_at = ?3, updated_at = MAX(updated_at, ?3)
        WHERE id = ?1 AND notes_updated_at < ?3 AND deleted = 0
        "#,
    )
    .bind(id.as_str())
    .bind(notes)
    .bind(ts)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Write the completion flag iff `ts` is strictly newer than the stored one.
pub async fn update_completed_if_newer(
    conn: &mut SqliteConnection,
    id: &TaskId,
    completed: bool,
    ts: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET completed = ?2, completed_updated_at = ?3, updated_at = MAX(updated_at, ?3)
        WHERE id = ?1 AND completed_updated_at < ?3 AND deleted = 0
        "#,
    )
    .bind(id.as_str())
    .bind(completed as i64)
    .bind(ts)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Overwrite the due date unconditionally (peer authority).
pub async fn set_due_date(
    conn: &mut SqliteConnection,
    id: &TaskId,
    due_date: Option<i64>,
    now: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET due_date = ?2, updated_at = MAX(updated_at, ?3) \
         WHERE id = ?1 AND deleted = 0",
    )
    .bind(id.as_str())
    .bind(due_date)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Bind the peer id. Fails the transaction on a uniqueness violation.
pub async fn set_peer_id(
    conn: &mut SqliteConnection,
    id: &TaskId,
    peer_id: PeerId,
) -> StoreResult<()> {
    sqlx::query("UPDATE tasks SET peer_id = ?2 WHERE id = ?1")
        .bind(id.as_str())
        .bind(peer_id.value() as i64)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Record that the row's state was acknowledged by the peer.
///
/// The row stays dirty while other operations for it are still queued.
pub async fn mark_synced(conn: &mut SqliteConnection, id: &TaskId, now: i64) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET synced_at = ?2,
            dirty = CASE WHEN EXISTS (
                SELECT 1 FROM outbox
                WHERE task_id = ?1 AND state IN ('PENDING', 'SENDING', 'SENT')
            ) THEN 1 ELSE 0 END
        WHERE id = ?1
        "#,
    )
    .bind(id.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Mark the record as reflecting peer-supplied state.
pub async fn mark_merged(conn: &mut SqliteConnection, id: &TaskId, now: i64) -> StoreResult<()> {
    sqlx::query("UPDATE tasks SET synced_at = ?2, dirty = 0 WHERE id = ?1")
        .bind(id.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Turn the row into a tombstone, creating one if absent.
///
/// Per-field timestamps rise to `at` so older inbound field writes lose
/// against the deletion.
pub async fn tombstone(conn: &mut SqliteConnection, id: &TaskId, at: i64) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tasks (id, deleted, title_updated_at, notes_updated_at,
                           completed_updated_at, updated_at, synced_at, dirty)
        VALUES (?1, 1, ?2, ?2, ?2, ?2, ?2, 0)
        ON CONFLICT(id) DO UPDATE SET
            deleted = 1,
            dirty = 0,
            synced_at = ?2,
            title_updated_at = MAX(title_updated_at, ?2),
            notes_updated_at = MAX(notes_updated_at, ?2),
            completed_updated_at = MAX(completed_updated_at, ?2),
            updated_at = MAX(updated_at, ?2)
        "#,
    )
    .bind(id.as_str())
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove a row outright.
pub async fn hard_delete(conn: &mut SqliteConnection, id: &TaskId) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Local edit: title.
pub async fn write_title(
    conn: &mut SqliteConnection,
    id: &TaskId,
    title: &str,
    now: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET title = ?2, title_updated_at = ?3, updated_at = ?3, dirty = 1 \
         WHERE id = ?1 AND deleted = 0",
    )
    .bind(id.as_str())
    .bind(title)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Local edit: notes.
pub async fn write_notes(
    conn: &mut SqliteConnection,
    id: &TaskId,
    notes: Option<&str>,
    now: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET notes = ?2, notes_updated_at = ?3, updated_at = ?3, dirty = 1 \
         WHERE id = ?1 AND deleted = 0",
    )
    .bind(id.as_str())
    .bind(notes)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Local edit: completion flag.
pub async fn write_completed(
    conn: &mut SqliteConnection,
    id: &TaskId,
    completed: bool,
    now: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET completed = ?2, completed_updated_at = ?3, updated_at = ?3, dirty = 1 \
         WHERE id = ?1 AND deleted = 0",
    )
    .bind(id.as_str())
    .bind(completed as i64)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Local edit: schedule fields.
#[allow(clippy::too_many_arguments)]
pub async fn write_schedule(
    conn: &mut SqliteConnection,
    id: &TaskId,
    due_date: Option<i64>,
    due_time: Option<i64>,
    reminder: bool,
    reminder_time: Option<i64>,
    now: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET due_date = ?2, due_time = ?3, reminder = ?4, reminder_time = ?5, \
         updated_at = ?6, dirty = 1 WHERE id = ?1 AND deleted = 0",
    )
    .bind(id.as_str())
    .bind(due_date)
    .bind(due_time)
    .bind(reminder as i64)
    .bind(reminder_time)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Local soft delete: the tombstone stays dirty until the DELETE op acks.
pub async fn write_deleted(conn: &mut SqliteConnection, id: &TaskId, now: i64) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET deleted = 1, updated_at = ?2, dirty = 1 \
         WHERE id = ?1 AND deleted = 0",
    )
    .bind(id.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Purge synced tombstones older than `threshold`.
///
/// Collects the aged rows and removes each through [`hard_delete`].
pub async fn cleanup_deleted(conn: &mut SqliteConnection, threshold: i64) -> StoreResult<u64> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM tasks WHERE deleted = 1 AND dirty = 0 AND updated_at < ?1",
    )
    .bind(threshold)
    .fetch_all(&mut *conn)
    .await?;

    let mut purged = 0;
    for id in ids {
        purged += hard_delete(&mut *conn, &TaskId::from(id)).await?;
    }
    Ok(purged)
}
