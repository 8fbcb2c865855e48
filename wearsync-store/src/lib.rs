//! # wearsync-store
//!
//! Transactional SQLite persistence for the wearsync engine.
//!
//! Four tables: `tasks`, `outbox`, `processed_ops`, `settings`. All
//! multi-row effects run inside a single SQLite transaction obtained from
//! [`Store::begin`]; the conditional-update primitives in [`tasks`] are
//! single atomic statements and form the base of the merge algorithm.
//!
//! Schema versioning is coarse: a version bump wipes and recreates every
//! table. The peer holds the source of truth, so a fresh snapshot
//! repopulates the store.

#![warn(clippy::all)]

mod error;
mod feed;
pub mod outbox;
pub mod processed;
pub mod settings;
pub mod tasks;

pub use error::{StoreError, StoreResult};
pub use feed::TaskFeed;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::watch;

/// Bumping this wipes the database on next open.
const SCHEMA_VERSION: i64 = 1;

/// Handle to the local database.
///
/// Cheap to clone; all clones share the pool and the task-revision
/// channel.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    tasks_rev: watch::Sender<u64>,
}

impl Store {
    /// Open (or create) the database at the given path.
    ///
    /// Uses WAL mode for concurrent reads/writes.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let path_str = path.to_str().ok_or_else(|| StoreError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(path_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Open an in-memory database (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // A single connection: each in-memory connection is its own db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let (tasks_rev, _) = watch::channel(0u64);
        let store = Self { pool, tasks_rev };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Begin a transaction spanning all four tables.
    pub async fn begin(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Check out a connection for reads outside a transaction.
    pub async fn acquire(&self) -> StoreResult<sqlx::pool::PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Subscribe to the tasks-table revision counter.
    ///
    /// The counter advances after every committed transaction that
    /// changed the tasks table.
    pub fn watch_tasks(&self) -> watch::Receiver<u64> {
        self.tasks_rev.subscribe()
    }

    /// Observe the active task list as a lazy, restartable feed.
    pub fn task_feed(&self) -> TaskFeed {
        TaskFeed::new(self.clone())
    }

    /// Advance the tasks revision. Call after committing a transaction
    /// that wrote the tasks table.
    pub fn notify_tasks_changed(&self) {
        self.tasks_rev.send_modify(|rev| *rev += 1);
    }

    /// Create the schema, wiping it first when the persisted version does
    /// not match [`SCHEMA_VERSION`].
    async fn run_migrations(&self) -> StoreResult<()> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;

        if version != 0 && version != SCHEMA_VERSION {
            tracing::warn!(
                from = version,
                to = SCHEMA_VERSION,
                "schema version changed, recreating database"
            );
            sqlx::query("DROP TABLE IF EXISTS tasks")
                .execute(&self.pool)
                .await?;
            sqlx::query("DROP TABLE IF EXISTS outbox")
                .execute(&self.pool)
                .await?;
            sqlx::query("DROP TABLE IF EXISTS processed_ops")
                .execute(&self.pool)
                .await?;
            sqlx::query("DROP TABLE IF EXISTS settings")
                .execute(&self.pool)
                .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                peer_id INTEGER UNIQUE,
                title TEXT NOT NULL DEFAULT '',
                notes TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                due_date INTEGER,
                due_time INTEGER,
                reminder INTEGER NOT NULL DEFAULT 0,
                reminder_time INTEGER,
                repeating INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                title_updated_at INTEGER NOT NULL DEFAULT 0,
                notes_updated_at INTEGER NOT NULL DEFAULT 0,
                completed_updated_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0,
                synced_at INTEGER NOT NULL DEFAULT 0,
                dirty INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                op_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'PENDING',
                last_attempt_at INTEGER,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_ops (
                op_id TEXT PRIMARY KEY,
                processed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                show_hidden INTEGER NOT NULL DEFAULT 0,
                show_completed INTEGER NOT NULL DEFAULT 1,
                filter TEXT NOT NULL DEFAULT '',
                collapsed_groups TEXT NOT NULL DEFAULT '',
                dirty INTEGER NOT NULL DEFAULT 0,
                synced_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_deleted ON tasks(deleted)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_dirty ON tasks(dirty)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_outbox_state_created ON outbox(state, created_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_processed_age ON processed_ops(processed_at)",
        )
        .execute(&self.pool)
        .await?;

        // The settings singleton always exists.
        sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (1)")
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
