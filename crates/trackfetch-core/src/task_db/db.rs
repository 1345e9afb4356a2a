//! Connection, migrations, and timestamp helpers. Task CRUD lives in
//! `tasks`, the journal in `journal_impl`.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

/// Workers, the scheduler and the CLI write concurrently; writers wait this
/// long for the lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the task database. Cheap to clone; all clones share one pool.
///
/// Stored under the XDG state directory:
/// `~/.local/state/trackfetch/tasks.db` on Linux.
#[derive(Clone, Debug)]
pub struct TaskDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl TaskDb {
    /// Open (or create) the default task database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let state_dir = crate::config::state_dir()?;
        Self::open_at(state_dir.join("tasks.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("open task database: {}", path.display()))?;
        let db = TaskDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // - `rejected_json`: candidate ids rejected for integrity this generation.
        // - `retry_after`: unix ms; NULL means dispatchable now.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                track_hash TEXT PRIMARY KEY NOT NULL,
                generation INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL,
                priority INTEGER NOT NULL,
                request_json TEXT NOT NULL,
                bytes_done INTEGER NOT NULL DEFAULT 0,
                bytes_total INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                retry_after INTEGER,
                file_path TEXT,
                current_peer TEXT,
                rejected_json TEXT NOT NULL DEFAULT '[]',
                last_error TEXT,
                needs_review INTEGER NOT NULL DEFAULT 0,
                review_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_checkpoint_at INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS tasks_dispatch
            ON tasks (state, priority, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal (
                track_hash TEXT PRIMARY KEY NOT NULL,
                generation INTEGER NOT NULL,
                phase TEXT NOT NULL,
                byte_offset INTEGER NOT NULL DEFAULT 0,
                heartbeat_at INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                failure_reason TEXT,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix milliseconds (for DB timestamps and retry deadlines).
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<TaskDb> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = TaskDb { pool };
    db.migrate().await?;
    Ok(db)
}
