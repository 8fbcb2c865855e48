//! Outbox table operations.
//!
//! The outbox is the durable FIFO queue of local operations. Rows are
//! drained oldest-first; `op_id` is the AUTOINCREMENT rowid, so ids are
//! monotonic and double as a tiebreaker for equal `created_at`.

use crate::StoreResult;
use sqlx::sqlite::SqliteConnection;
use wearsync_types::{OpId, OpKind, OutboxEntry, OutboxState, TaskId};

#[derive(sqlx::FromRow)]
struct OutboxRow {
    op_id: i64,
    task_id: String,
    kind: String,
    payload: Vec<u8>,
    created_at: i64,
    attempts: i64,
    state: String,
    last_attempt_at: Option<i64>,
    error_message: Option<String>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = crate::StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEntry {
            op_id: OpId::new(row.op_id as u64),
            task_id: TaskId::from(row.task_id),
            kind: OpKind::parse(&row.kind)?,
            payload: row.payload,
            created_at: row.created_at,
            attempts: row.attempts,
            state: OutboxState::parse(&row.state)?,
            last_attempt_at: row.last_attempt_at,
            error_message: row.error_message,
        })
    }
}

const SELECT_COLUMNS: &str =
    "op_id, task_id, kind, payload, created_at, attempts, state, last_attempt_at, error_message";

/// Enqueue an operation; the store assigns the next op id.
pub async fn insert(
    conn: &mut SqliteConnection,
    task_id: &TaskId,
    kind: OpKind,
    payload: &[u8],
    created_at: i64,
) -> StoreResult<OpId> {
    let result = sqlx::query(
        "INSERT INTO outbox (task_id, kind, payload, created_at, attempts, state) \
         VALUES (?1, ?2, ?3, ?4, 0, 'PENDING')",
    )
    .bind(task_id.as_str())
    .bind(kind.as_str())
    .bind(payload)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;
    Ok(OpId::new(result.last_insert_rowid() as u64))
}

/// Fetch a single entry.
pub async fn get(conn: &mut SqliteConnection, op_id: OpId) -> StoreResult<Option<OutboxEntry>> {
    let row = sqlx::query_as::<_, OutboxRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM outbox WHERE op_id = ?1"
    ))
    .bind(op_id.value() as i64)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(OutboxEntry::try_from).transpose()
}

/// Undelivered entries in enqueue order.
pub async fn list_pending_in_order(conn: &mut SqliteConnection) -> StoreResult<Vec<OutboxEntry>> {
    let rows = sqlx::query_as::<_, OutboxRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM outbox \
         WHERE state IN ('PENDING', 'SENDING') \
         ORDER BY created_at ASC, op_id ASC"
    ))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(OutboxEntry::try_from).collect()
}

/// Begin a send attempt: `SENDING`, attempts incremented.
pub async fn mark_sending(conn: &mut SqliteConnection, op_id: OpId, now: i64) -> StoreResult<()> {
    sqlx::query(
        "UPDATE outbox SET state = 'SENDING', attempts = attempts + 1, last_attempt_at = ?2 \
         WHERE op_id = ?1",
    )
    .bind(op_id.value() as i64)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The bus accepted the put.
pub async fn mark_sent(conn: &mut SqliteConnection, op_id: OpId) -> StoreResult<()> {
    sqlx::query("UPDATE outbox SET state = 'SENT' WHERE op_id = ?1")
        .bind(op_id.value() as i64)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The peer acknowledged the operation.
pub async fn mark_acked(conn: &mut SqliteConnection, op_id: OpId) -> StoreResult<()> {
    sqlx::query("UPDATE outbox SET state = 'ACKED', error_message = NULL WHERE op_id = ?1")
        .bind(op_id.value() as i64)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// A transient put failure: back to `PENDING` for the next drain.
pub async fn mark_retry(conn: &mut SqliteConnection, op_id: OpId, err: &str) -> StoreResult<()> {
    sqlx::query("UPDATE outbox SET state = 'PENDING', error_message = ?2 WHERE op_id = ?1")
        .bind(op_id.value() as i64)
        .bind(err)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Terminal failure: excluded from drain until operator intervention.
pub async fn mark_failed(conn: &mut SqliteConnection, op_id: OpId, err: &str) -> StoreResult<()> {
    sqlx::query("UPDATE outbox SET state = 'FAILED', error_message = ?2 WHERE op_id = ?1")
        .bind(op_id.value() as i64)
        .bind(err)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Reset entries stuck in `SENDING` since before `threshold`.
pub async fn reset_stuck(conn: &mut SqliteConnection, threshold: i64) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE outbox SET state = 'PENDING' \
         WHERE state = 'SENDING' AND last_attempt_at < ?1",
    )
    .bind(threshold)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Drop acknowledged entries.
pub async fn delete_acked(conn: &mut SqliteConnection) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM outbox WHERE state = 'ACKED'")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Number of permanently failed entries.
pub async fn count_failed(conn: &mut SqliteConnection) -> StoreResult<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE state = 'FAILED'")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let task = TaskId::from("t");

        let a = insert(&mut conn, &task, OpKind::Create, b"{}", 10)
            .await
            .unwrap();
        let b = insert(&mut conn, &task, OpKind::Update, b"{}", 20)
            .await
            .unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn pending_listing_is_fifo_and_includes_sending() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let task = TaskId::from("t");

        let first = insert(&mut conn, &task, OpKind::Create, b"{}", 10)
            .await
            .unwrap();
        let second = insert(&mut conn, &task, OpKind::Update, b"{}", 20)
            .await
            .unwrap();
        let third = insert(&mut conn, &task, OpKind::Update, b"{}", 30)
            .await
            .unwrap();

        mark_sending(&mut conn, first, 100).await.unwrap();
        mark_sending(&mut conn, third, 100).await.unwrap();
        mark_sent(&mut conn, third).await.unwrap();
        mark_acked(&mut conn, third).await.unwrap();

        let pending = list_pending_in_order(&mut conn).await.unwrap();
        let ids: Vec<OpId> = pending.iter().map(|e| e.op_id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(pending[0].state, OutboxState::Sending);
        assert_eq!(pending[1].state, OutboxState::Pending);
    }

    #[tokio::test]
    async fn mark_sending_increments_attempts() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let op = insert(&mut conn, &TaskId::from("t"), OpKind::Create, b"{}", 10)
            .await
            .unwrap();

        mark_sending(&mut conn, op, 100).await.unwrap();
        mark_retry(&mut conn, op, "bus unreachable").await.unwrap();
        mark_sending(&mut conn, op, 200).await.unwrap();

        let entry = get(&mut conn, op).await.unwrap().unwrap();
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.last_attempt_at, Some(200));
        assert_eq!(entry.error_message.as_deref(), Some("bus unreachable"));
    }

    #[tokio::test]
    async fn reset_stuck_only_touches_old_sending() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let task = TaskId::from("t");

        let stuck = insert(&mut conn, &task, OpKind::Create, b"{}", 10)
            .await
            .unwrap();
        let fresh = insert(&mut conn, &task, OpKind::Update, b"{}", 20)
            .await
            .unwrap();
        mark_sending(&mut conn, stuck, 1_000).await.unwrap();
        mark_sending(&mut conn, fresh, 9_000).await.unwrap();

        let reset = reset_stuck(&mut conn, 5_000).await.unwrap();
        assert_eq!(reset, 1);
        assert_eq!(
            get(&mut conn, stuck).await.unwrap().unwrap().state,
            OutboxState::Pending
        );
        assert_eq!(
            get(&mut conn, fresh).await.unwrap().unwrap().state,
            OutboxState::Sending
        );
    }

    #[tokio::test]
    async fn delete_acked_leaves_others() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let task = TaskId::from("t");

        let acked = insert(&mut conn, &task, OpKind::Create, b"{}", 10)
            .await
            .unwrap();
        let pending = insert(&mut conn, &task, OpKind::Update, b"{}", 20)
            .await
            .unwrap();
        mark_acked(&mut conn, acked).await.unwrap();

        let deleted = delete_acked(&mut conn).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(get(&mut conn, acked).await.unwrap().is_none());
        assert!(get(&mut conn, pending).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_entries_are_excluded_from_drain() {
        let store = Store::in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let op = insert(&mut conn, &TaskId::from("t"), OpKind::Create, b"{}", 10)
            .await
            .unwrap();
        mark_failed(&mut conn, op, "gave up").await.unwrap();

        assert!(list_pending_in_order(&mut conn).await.unwrap().is_empty());
        assert_eq!(count_failed(&mut conn).await.unwrap(), 1);
    }
}
