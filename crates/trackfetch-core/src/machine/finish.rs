//! Where a transfer ends: finalize on success, or map the failure to the
//! task's next state.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::transfer::discard_quietly;
use super::{Step, Superseded, TaskOutcome, TaskState, Worker, WorkerContext};
use crate::candidate::SearchCandidate;
use crate::retry::{classify, peer_fault, AcquisitionError, CancelReason, ErrorKind, RetryDecision};
use crate::scheduler::AcquisitionEvent;
use crate::storage;
use crate::task_db::unix_millis;
use crate::track::TrackHash;

impl Worker {
    /// The transport reported success. Check the bytes on disk against the
    /// declared size before the file may take its final name.
    pub(super) async fn finish_success(
        &mut self,
        candidate: &SearchCandidate,
        temp: &Path,
        final_path: &Path,
    ) -> Result<Step> {
        let on_disk = match storage::partial_len(temp).await {
            Ok(len) => len.unwrap_or(0),
            Err(e) => return self.on_error(AcquisitionError::Io(e), candidate, temp, 0).await,
        };
        if on_disk != candidate.size_bytes {
            let err = AcquisitionError::IntegrityRejection {
                candidate: candidate.id(),
                reason: format!(
                    "size mismatch: declared {} bytes, received {on_disk}",
                    candidate.size_bytes
                ),
            };
            return self.on_error(err, candidate, temp, on_disk).await;
        }

        self.checkpoint(on_disk).await?;
        if let Err(e) = storage::finalize(temp, final_path).await {
            return self.on_error(AcquisitionError::Io(e), candidate, temp, on_disk).await;
        }
        if !self
            .ctx
            .db
            .complete(&self.task.hash, self.task.generation, final_path, on_disk)
            .await?
        {
            return Err(Superseded.into());
        }

        let from = self.task.state;
        self.task.state = TaskState::Completed;
        self.task.bytes_done = on_disk;
        self.task.file_path = Some(final_path.to_path_buf());
        tracing::info!(
            track = %self.task.hash.short(),
            peer = %candidate.peer,
            path = %final_path.display(),
            bytes = on_disk,
            "track completed"
        );
        self.ctx.events.emit(AcquisitionEvent::StateChanged {
            hash: self.task.hash.clone(),
            from,
            to: TaskState::Completed,
        });
        self.ctx.journal.commit(&self.task.hash).await?;
        self.ctx.peers.record_success(&candidate.peer);
        self.spawn_verification(final_path);

        Ok(Step::Done(TaskOutcome::Completed {
            path: final_path.to_path_buf(),
        }))
    }

    /// Run the verification hook off the worker slot. A failed check flags
    /// the track; it stays `Completed`. Shutdown waits for the check.
    fn spawn_verification(&self, path: &Path) {
        let Some(hook) = self.ctx.verifier.clone() else {
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        let hash = self.task.hash.clone();
        let request = self.task.request.clone();
        let path = path.to_path_buf();
        self.ctx.spawn_background(async move {
            let result = hook.verify(&path, &request).await;
            if result.passed {
                tracing::debug!(track = %hash.short(), "verification passed");
                return;
            }
            let reason = result.reason.unwrap_or_else(|| "verification failed".to_string());
            match ctx.db.mark_review(&hash, &reason).await {
                Ok(true) => {
                    tracing::warn!(track = %hash.short(), %reason, "completed track needs review");
                    ctx.events.emit(AcquisitionEvent::NeedsReview { hash, reason });
                }
                Ok(false) => {}
                Err(e) => tracing::error!(track = %hash.short(), error = %e, "failed to flag track for review"),
            }
        });
    }

    /// Map one candidate's failure to the task's next step.
    pub(super) async fn on_error(
        &mut self,
        err: AcquisitionError,
        candidate: &SearchCandidate,
        temp: &Path,
        offset: u64,
    ) -> Result<Step> {
        if let Some((peer, cause)) = peer_fault(&err) {
            self.ctx.peers.record_failure(peer, cause);
        }
        let kind = classify(&err);
        match kind {
            ErrorKind::Transient => {
                tracing::warn!(track = %self.task.hash.short(), error = %err, "transfer failed; trying next candidate");
                // Later attempts start from zero, possibly under another name.
                discard_quietly(temp).await;
                Ok(Step::Next(err))
            }
            ErrorKind::Integrity => {
                tracing::warn!(track = %self.task.hash.short(), error = %err, "candidate rejected");
                let id = candidate.id();
                self.ctx
                    .db
                    .add_rejected(&self.task.hash, self.task.generation, &id)
                    .await?;
                self.task.rejected.insert(id);
                discard_quietly(temp).await;
                Ok(Step::Next(err))
            }
            ErrorKind::Stall => {
                tracing::warn!(track = %self.task.hash.short(), error = %err, "transfer force-aborted");
                self.ctx.journal.abort(&self.task.hash, "stalled").await?;
                discard_quietly(temp).await;
                self.transition(TaskState::Pending, Some(&err.to_string())).await?;
                Ok(Step::Done(TaskOutcome::Stalled))
            }
            ErrorKind::Io | ErrorKind::Corruption => {
                let reason = err.to_string();
                tracing::error!(track = %self.task.hash.short(), error = %reason, "unrecoverable failure");
                self.ctx.journal.abort(&self.task.hash, &reason).await?;
                self.transition(TaskState::Failed, Some(&reason)).await?;
                Ok(Step::Done(self.dead_letter(&reason).await?))
            }
            ErrorKind::Cancelled => {
                let reason = match err {
                    AcquisitionError::Cancelled(reason) => reason,
                    _ => self.cancel.reason(),
                };
                Ok(Step::Done(self.settle_cancel(reason, Some(offset)).await?))
            }
        }
    }

    /// Park the task according to why its worker was stopped. `offset` is
    /// the partial length when a transfer was running.
    pub(super) async fn settle_cancel(&mut self, reason: CancelReason, offset: Option<u64>) -> Result<TaskOutcome> {
        if reason == CancelReason::Cancel {
            self.ctx.journal.abort(&self.task.hash, "cancelled").await?;
            return self.dead_letter("cancelled").await;
        }

        if let (TaskState::Transferring, Some(offset)) = (self.task.state, offset) {
            let offset = offset.min(self.task.bytes_total.unwrap_or(offset));
            self.checkpoint(offset).await?;
            self.ctx
                .db
                .record_progress(&self.task.hash, self.task.generation, offset)
                .await?;
            self.task.bytes_done = offset;
        }

        let (to, outcome) = match reason {
            CancelReason::Pause => (TaskState::Paused, TaskOutcome::Paused),
            CancelReason::Preempt => (TaskState::Deferred, TaskOutcome::Deferred),
            _ => (TaskState::Pending, TaskOutcome::Interrupted),
        };
        self.transition(to, None).await?;
        tracing::info!(track = %self.task.hash.short(), ?reason, bytes = self.task.bytes_done, "worker stopped");
        Ok(outcome)
    }

    /// Move the task to the dead-letter list.
    pub(super) async fn dead_letter(&mut self, reason: &str) -> Result<TaskOutcome> {
        self.transition(TaskState::PermanentlyFailed, Some(reason)).await?;
        tracing::info!(track = %self.task.hash.short(), %reason, "task dead-lettered");
        self.ctx.events.emit(AcquisitionEvent::DeadLettered {
            hash: self.task.hash.clone(),
            reason: reason.to_string(),
        });
        Ok(TaskOutcome::DeadLettered {
            reason: reason.to_string(),
        })
    }
}

/// Settle a task whose worker crashed: `Failed`, then the usual soft-retry
/// accounting. Does nothing if the task is no longer worker-owned.
pub async fn settle_crash(ctx: &WorkerContext, hash: &TrackHash, reason: &str) -> Result<TaskOutcome> {
    let Some(task) = ctx.db.get_task(hash).await? else {
        return Ok(TaskOutcome::Superseded);
    };
    if !task.state.is_active() {
        return Ok(TaskOutcome::Superseded);
    }
    let gen = task.generation;
    if !ctx.db.transition(hash, gen, task.state, TaskState::Failed, Some(reason)).await? {
        return Ok(TaskOutcome::Superseded);
    }
    ctx.events.emit(AcquisitionEvent::StateChanged {
        hash: hash.clone(),
        from: task.state,
        to: TaskState::Failed,
    });

    let attempt = task.retry_count.saturating_add(1);
    match ctx.retry.decide(attempt, ErrorKind::Transient) {
        RetryDecision::RetryAfter(delay) => {
            let at = unix_millis().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
            ctx.db.set_retry(hash, gen, attempt, Some(at)).await?;
            if ctx.db.transition(hash, gen, TaskState::Failed, TaskState::Pending, None).await? {
                ctx.events.emit(AcquisitionEvent::StateChanged {
                    hash: hash.clone(),
                    from: TaskState::Failed,
                    to: TaskState::Pending,
                });
            }
            Ok(TaskOutcome::Retrying { after: delay })
        }
        RetryDecision::NoRetry => {
            ctx.db.set_retry(hash, gen, attempt, None).await?;
            ctx.journal.abort(hash, reason).await?;
            if ctx
                .db
                .transition(hash, gen, TaskState::Failed, TaskState::PermanentlyFailed, Some(reason))
                .await?
            {
                tracing::info!(track = %hash.short(), %reason, "task dead-lettered");
                ctx.events.emit(AcquisitionEvent::DeadLettered {
                    hash: hash.clone(),
                    reason: reason.to_string(),
                });
            }
            Ok(TaskOutcome::DeadLettered {
                reason: reason.to_string(),
            })
        }
    }
}
