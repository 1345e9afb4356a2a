//! Task read operations: get, list, dispatch selection.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::TaskDb;
use super::TASK_COLUMNS;
use crate::candidate::CandidateId;
use crate::machine::{DownloadTask, TaskState};
use crate::peer_health::PeerId;
use crate::track::{TrackHash, TrackRequest};

impl TaskDb {
    /// Fetch one task by hash.
    pub async fn get_task(&self, hash: &TrackHash) -> Result<Option<DownloadTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE track_hash = ?1");
        let row = sqlx::query(&sql)
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    /// All tasks in dispatch order (most urgent first).
    pub async fn list_tasks(&self) -> Result<Vec<DownloadTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY priority ASC, created_at ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn list_in_state(&self, state: TaskState) -> Result<Vec<DownloadTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE state = ?1 \
             ORDER BY priority ASC, created_at ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Dead-lettered tasks awaiting operator review.
    pub async fn dead_letters(&self) -> Result<Vec<DownloadTask>> {
        self.list_in_state(TaskState::PermanentlyFailed).await
    }

    /// Most urgent `Pending`/`Deferred` task whose retry delay has passed and
    /// that has no live worker. Does not modify the row: the scheduler's
    /// active set is what keeps a hash from being dispatched twice.
    pub async fn next_dispatchable(
        &self,
        active: &HashSet<TrackHash>,
        now: i64,
    ) -> Result<Option<DownloadTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE state IN ('pending', 'deferred') \
               AND (retry_after IS NULL OR retry_after <= ?1) \
             ORDER BY priority ASC, created_at ASC, rowid ASC \
             LIMIT ?2"
        );
        let limit = i64::try_from(active.len() + 1).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            let task = task_from_row(row)?;
            if !active.contains(&task.hash) {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    /// Earliest `retry_after` among waiting tasks, for scheduler wakeups.
    pub async fn next_retry_at(&self) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(retry_after) AS next_at FROM tasks
            WHERE state IN ('pending', 'deferred') AND retry_after IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("next_at")?)
    }
}

pub(in crate::task_db) fn task_from_row(row: &SqliteRow) -> Result<DownloadTask> {
    let hash: String = row.try_get("track_hash")?;
    let state: String = row.try_get("state")?;
    let request_json: String = row.try_get("request_json")?;
    let rejected_json: String = row.try_get("rejected_json")?;
    let file_path: Option<String> = row.try_get("file_path")?;
    let current_peer: Option<String> = row.try_get("current_peer")?;
    let bytes_total: Option<i64> = row.try_get("bytes_total")?;

    let request: TrackRequest = serde_json::from_str(&request_json)
        .with_context(|| format!("task {hash}: bad request_json"))?;
    let rejected: Vec<CandidateId> = serde_json::from_str(&rejected_json)
        .with_context(|| format!("task {hash}: bad rejected_json"))?;

    Ok(DownloadTask {
        state: state.parse().with_context(|| format!("task {hash}"))?,
        generation: non_negative(row.try_get("generation")?) as u32,
        priority: non_negative(row.try_get("priority")?).min(u64::from(u32::MAX)) as u32,
        request,
        bytes_done: non_negative(row.try_get("bytes_done")?),
        bytes_total: bytes_total.map(non_negative),
        retry_count: non_negative(row.try_get("retry_count")?).min(u64::from(u32::MAX)) as u32,
        retry_after: row.try_get("retry_after")?,
        file_path: file_path.map(PathBuf::from),
        current_peer: current_peer.map(PeerId::new),
        rejected: rejected.into_iter().collect::<HashSet<_>>(),
        last_error: row.try_get("last_error")?,
        needs_review: row.try_get::<i64, _>("needs_review")? != 0,
        review_reason: row.try_get("review_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_checkpoint_at: row.try_get("last_checkpoint_at")?,
        hash: TrackHash::from_stored(hash),
    })
}

fn non_negative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}
