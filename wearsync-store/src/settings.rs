//! Settings singleton operations.
//!
//! Settings are never merged field-by-field. The peer's copy applies
//! wholesale, and only while the local row carries no unsent changes.

use crate::StoreResult;
use sqlx::sqlite::SqliteConnection;
use wearsync_types::{decode_groups, encode_groups, Settings, SettingsDelta};

#[derive(sqlx::FromRow)]
struct SettingsRow {
    show_hidden: i64,
    show_completed: i64,
    filter: String,
    collapsed_groups: String,
    dirty: i64,
    synced_at: i64,
}

impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        Settings {
            show_hidden: row.show_hidden != 0,
            show_completed: row.show_completed != 0,
            filter: row.filter,
            collapsed_groups: decode_groups(&row.collapsed_groups),
            dirty: row.dirty != 0,
            synced_at: row.synced_at,
        }
    }
}

/// Fetch the singleton row.
pub async fn get(conn: &mut SqliteConnection) -> StoreResult<Settings> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT show_hidden, show_completed, filter, collapsed_groups, dirty, synced_at \
         FROM settings WHERE id = 1",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(Settings::from(row))
}

/// Apply a local UI edit; the row becomes dirty.
///
/// `synced_at` is left alone: a dirty row keeps its last-acknowledged
/// timestamp until the peer confirms the new state.
pub async fn update_local(
    conn: &mut SqliteConnection,
    delta: &SettingsDelta,
) -> StoreResult<Settings> {
    let mut current = get(conn).await?;
    if let Some(v) = delta.show_hidden {
        current.show_hidden = v;
    }
    if let Some(v) = delta.show_completed {
        current.show_completed = v;
    }
    if let Some(v) = &delta.filter {
        current.filter = v.clone();
    }
    if let Some(v) = &delta.collapsed_groups {
        current.collapsed_groups = v.clone();
    }
    current.dirty = true;

    sqlx::query(
        "UPDATE settings SET show_hidden = ?1, show_completed = ?2, filter = ?3, \
         collapsed_groups = ?4, dirty = 1 WHERE id = 1",
    )
    .bind(current.show_hidden as i64)
    .bind(current.show_completed as i64)
    .bind(&current.filter)
    .bind(encode_groups(&current.collapsed_groups))
    .execute(&mut *conn)
    .await?;

    Ok(current)
}

/// Apply the peer's settings wholesale, but only when the local row is
/// clean. Returns whether anything was written.
pub async fn apply_peer(
    conn: &mut SqliteConnection,
    incoming: &Settings,
    now: i64,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "UPDATE settings SET show_hidden = ?1, show_completed = ?2, filter = ?3, \
         collapsed_groups = ?4, synced_at = ?5 WHERE id = 1 AND dirty = 0",
    )
    .bind(incoming.show_hidden as i64)
    .bind(incoming.show_completed as i64)
    .bind(&incoming.filter)
    .bind(encode_groups(&incoming.collapsed_groups))
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record acknowledgment of the local settings state.
pub async fn mark_synced(conn: &mut SqliteConnection, now: i64) -> StoreResult<()> {
    sqlx::query("UPDATE settings SET dirty = 0, synced_at = ?1 WHERE id = 1")
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
