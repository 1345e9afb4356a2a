//! Task write operations: enqueue, state transitions, progress, resets.

use std::path::Path;

use anyhow::{bail, Context, Result};
use sqlx::Row;

use super::super::db::{unix_millis, TaskDb};
use crate::candidate::CandidateId;
use crate::machine::{Priority, TaskState, HARD_RETRY_PRIORITY};
use crate::peer_health::PeerId;
use crate::track::{TrackHash, TrackRequest};

/// Result of `TaskDb::enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// Already known; its priority was raised to the requested one.
    PriorityRaised { state: TaskState },
    /// Already known at the same or higher urgency; nothing changed.
    Unchanged { state: TaskState },
}

impl TaskDb {
    /// Add a track to the queue. Re-queuing a known hash never resets it: a
    /// `Completed` track stays completed, and any other state only has its
    /// priority raised if the new one is more urgent.
    pub async fn enqueue(&self, request: &TrackRequest, priority: Priority) -> Result<EnqueueOutcome> {
        let hash = request.hash();
        let now = unix_millis();
        let request_json = serde_json::to_string(request)?;
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT state, priority FROM tasks WHERE track_hash = ?1")
            .bind(hash.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO tasks (
                        track_hash, generation, state, priority, request_json,
                        created_at, updated_at
                    ) VALUES (?1, 0, ?2, ?3, ?4, ?5, ?5)
                    "#,
                )
                .bind(hash.as_str())
                .bind(TaskState::Pending.as_str())
                .bind(i64::from(priority))
                .bind(&request_json)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                EnqueueOutcome::Inserted
            }
            Some(row) => {
                let state: TaskState = row.try_get::<String, _>("state")?.parse()?;
                let current: i64 = row.try_get("priority")?;
                if state == TaskState::Completed || current <= i64::from(priority) {
                    EnqueueOutcome::Unchanged { state }
                } else {
                    sqlx::query(
                        "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE track_hash = ?3",
                    )
                    .bind(i64::from(priority))
                    .bind(now)
                    .bind(hash.as_str())
                    .execute(&mut *tx)
                    .await?;
                    EnqueueOutcome::PriorityRaised { state }
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    /// Move a task `from → to` if it is still in `from` at `generation`.
    ///
    /// Returns `false` when the row did not match (another actor changed it
    /// first, or a `HardRetry` started a new generation). An illegal edge is
    /// an error. `error` replaces `last_error` when given.
    pub async fn transition(
        &self,
        hash: &TrackHash,
        generation: u32,
        from: TaskState,
        to: TaskState,
        error: Option<&str>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            bail!("illegal task transition {from} -> {to} for {}", hash.short());
        }
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET state = ?1,
                last_error = COALESCE(?2, last_error),
                updated_at = ?3
            WHERE track_hash = ?4 AND generation = ?5 AND state = ?6
            "#,
        )
        .bind(to.as_str())
        .bind(error)
        .bind(unix_millis())
        .bind(hash.as_str())
        .bind(i64::from(generation))
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Remember the candidate a worker is about to transfer from.
    pub async fn record_selection(
        &self,
        hash: &TrackHash,
        generation: u32,
        peer: &PeerId,
        final_path: &Path,
        bytes_total: u64,
        bytes_done: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET current_peer = ?1,
                file_path = ?2,
                bytes_total = ?3,
                bytes_done = ?4,
                updated_at = ?5
            WHERE track_hash = ?6 AND generation = ?7
            "#,
        )
        .bind(peer.as_str())
        .bind(final_path.to_string_lossy().as_ref())
        .bind(to_i64(bytes_total))
        .bind(to_i64(bytes_done))
        .bind(unix_millis())
        .bind(hash.as_str())
        .bind(i64::from(generation))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Byte progress, written after the matching journal checkpoint.
    pub async fn record_progress(&self, hash: &TrackHash, generation: u32, bytes_done: u64) -> Result<()> {
        let now = unix_millis();
        sqlx::query(
            r#"
            UPDATE tasks
            SET bytes_done = ?1, last_checkpoint_at = ?2, updated_at = ?2
            WHERE track_hash = ?3 AND generation = ?4
            "#,
        )
        .bind(to_i64(bytes_done))
        .bind(now)
        .bind(hash.as_str())
        .bind(i64::from(generation))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Retry bookkeeping set before `Failed → Pending` (or dead-lettering).
    pub async fn set_retry(
        &self,
        hash: &TrackHash,
        generation: u32,
        retry_count: u32,
        retry_after: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET retry_count = ?1, retry_after = ?2, updated_at = ?3
            WHERE track_hash = ?4 AND generation = ?5
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(retry_after)
        .bind(unix_millis())
        .bind(hash.as_str())
        .bind(i64::from(generation))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Never offer `candidate` to this task again (until a `HardRetry`).
    pub async fn add_rejected(&self, hash: &TrackHash, generation: u32, candidate: &CandidateId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT rejected_json FROM tasks WHERE track_hash = ?1 AND generation = ?2")
            .bind(hash.as_str())
            .bind(i64::from(generation))
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(());
        };
        let json: String = row.try_get("rejected_json")?;
        let mut rejected: Vec<CandidateId> =
            serde_json::from_str(&json).with_context(|| format!("task {}: bad rejected_json", hash.short()))?;
        if !rejected.contains(candidate) {
            rejected.push(candidate.clone());
            rejected.sort();
        }
        sqlx::query("UPDATE tasks SET rejected_json = ?1, updated_at = ?2 WHERE track_hash = ?3")
            .bind(serde_json::to_string(&rejected)?)
            .bind(unix_millis())
            .bind(hash.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `Transferring → Completed`, recording where the file landed.
    pub async fn complete(
        &self,
        hash: &TrackHash,
        generation: u32,
        final_path: &Path,
        bytes: u64,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'completed',
                file_path = ?1,
                bytes_done = ?2,
                bytes_total = ?2,
                retry_after = NULL,
                last_error = NULL,
                updated_at = ?3
            WHERE track_hash = ?4 AND generation = ?5 AND state = 'transferring'
            "#,
        )
        .bind(final_path.to_string_lossy().as_ref())
        .bind(to_i64(bytes))
        .bind(unix_millis())
        .bind(hash.as_str())
        .bind(i64::from(generation))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Flag a completed track for review without changing its state.
    pub async fn mark_review(&self, hash: &TrackHash, reason: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks SET needs_review = 1, review_reason = ?1, updated_at = ?2
            WHERE track_hash = ?3 AND state = 'completed'
            "#,
        )
        .bind(reason)
        .bind(unix_millis())
        .bind(hash.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Dead-letter a task regardless of its current state (unless completed).
    /// Used when its journal entry cannot be trusted.
    pub async fn dead_letter(&self, hash: &TrackHash, reason: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks SET state = 'permanently_failed', last_error = ?1, updated_at = ?2
            WHERE track_hash = ?3 AND state NOT IN ('completed', 'permanently_failed')
            "#,
        )
        .bind(reason)
        .bind(unix_millis())
        .bind(hash.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Reset every worker-owned state to `Pending`. Only valid when no
    /// worker is running, i.e. at startup.
    pub async fn reset_active_to_pending(&self) -> Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE tasks SET state = 'pending', updated_at = ?1
            WHERE state IN ('searching', 'candidate_selected', 'transferring')
            "#,
        )
        .bind(unix_millis())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    /// Start a fresh generation: maximum priority, empty retry budget and
    /// rejection list, back to `Pending`, and the old journal entry purged.
    /// Returns the new generation, or `None` if the task is unknown,
    /// completed, or owned by a worker.
    pub async fn reset_for_hard_retry(&self, hash: &TrackHash) -> Result<Option<u32>> {
        let now = unix_millis();
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET generation = generation + 1,
                state = 'pending',
                priority = ?1,
                bytes_done = 0,
                retry_count = 0,
                retry_after = NULL,
                current_peer = NULL,
                rejected_json = '[]',
                last_error = NULL,
                last_checkpoint_at = NULL,
                updated_at = ?2
            WHERE track_hash = ?3
              AND state NOT IN ('completed', 'searching', 'candidate_selected', 'transferring')
            "#,
        )
        .bind(i64::from(HARD_RETRY_PRIORITY))
        .bind(now)
        .bind(hash.as_str())
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        sqlx::query("DELETE FROM journal WHERE track_hash = ?1")
            .bind(hash.as_str())
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query("SELECT generation FROM tasks WHERE track_hash = ?1")
            .bind(hash.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let generation: i64 = row.try_get("generation")?;
        tx.commit().await?;
        Ok(Some(u32::try_from(generation).unwrap_or(u32::MAX)))
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
