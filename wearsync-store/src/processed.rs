//! Idempotency log (processed remote operations).
//!
//! Set semantics: at most one row per remote op id. Inserting an already
//! present id is a no-op, which is what makes inbound apply idempotent.

use crate::StoreResult;
use sqlx::sqlite::SqliteConnection;

/// Whether the op id was already applied.
pub async fn is_processed(conn: &mut SqliteConnection, op_id: &str) -> StoreResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_ops WHERE op_id = ?1")
        .bind(op_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Record an op id as applied (idempotent).
pub async fn mark_processed(conn: &mut SqliteConnection, op_id: &str, now: i64) -> StoreResult<()> {
    sqlx::query("INSERT OR IGNORE INTO processed_ops (op_id, processed_at) VALUES (?1, ?2)")
        .bind(op_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Purge entries processed before `threshold`.
pub async fn cleanup_old(conn: &mut SqliteConnection, threshold: i64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM processed_ops WHERE processed_at < ?1")
        .bind(threshold)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
