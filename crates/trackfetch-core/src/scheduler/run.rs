//! Dispatch loop: recovery, the worker pool, and the connectivity circuit
//! breaker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use super::control::SlotGuard;
use super::{preempt, AcquisitionEvent, ConnectionStatus, Scheduler};
use crate::journal::recover;
use crate::machine::{run_task, settle_crash, DownloadTask, TaskOutcome};
use crate::retry::ReconnectBackoff;
use crate::task_db::unix_millis;
use crate::track::TrackHash;

/// Floor for configured wait intervals, so a zero in the config cannot
/// turn the loop into a spin.
const MIN_WAIT: Duration = Duration::from_millis(10);

type Workers = JoinSet<(TrackHash, TaskOutcome)>;

impl Scheduler {
    /// Recover from the journal, then dispatch until `shutdown`. On
    /// shutdown every worker parks its task (`Pending`, journal kept),
    /// pending verification checks finish, and the peer table is flushed
    /// before this returns.
    pub async fn run(&self) -> Result<()> {
        let report = recover(&self.ctx.db, self.ctx.journal.as_ref()).await?;
        tracing::info!(
            resumable = report.resumable.len(),
            reset = report.reset,
            stale = report.stale.len(),
            committed = report.committed.len(),
            corrupt = report.corrupt.len(),
            "journal recovery complete"
        );
        for (hash, reason) in &report.corrupt {
            self.ctx.events.emit(AcquisitionEvent::DeadLettered {
                hash: hash.clone(),
                reason: format!("journal corruption: {reason}"),
            });
        }

        let slots = self.ctx.config.worker_slots();
        let mut workers = Workers::new();
        let mut backoff = ReconnectBackoff::from_config(&self.ctx.config.reconnect);
        let mut flush = tokio::time::interval(self.ctx.config.flush_interval().max(MIN_WAIT));
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush.tick().await;
        tracing::info!(slots, "scheduler started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            if !self.ctx.transport.is_connected().await {
                if !self.hold_for_reconnect(&mut backoff, &mut workers).await {
                    break;
                }
                continue;
            }
            if backoff.attempts() > 0 {
                tracing::info!(attempts = backoff.attempts(), "transport reconnected; dispatch resumed");
                backoff.reset();
                self.set_connection(ConnectionStatus::Connected);
                self.ctx.events.emit(AcquisitionEvent::Reconnected);
            }

            let wait = match self.dispatch(&mut workers, slots).await {
                Ok(()) => self.idle_wait().await,
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "dispatch failed");
                    self.ctx.config.poll_interval().max(MIN_WAIT)
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => self.settle(joined).await,
                _ = self.wake.notified() => {}
                _ = flush.tick() => self.flush_peers().await,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        // Worker tokens are children of the shutdown token.
        while let Some(joined) = workers.join_next().await {
            self.settle(joined).await;
        }
        self.ctx.drain_background().await;
        self.flush_peers().await;
        tracing::info!("scheduler stopped");
        Ok(())
    }

    /// Start workers for the most urgent dispatchable tasks until the pool
    /// is full. With a full pool, a strictly more urgent waiting task
    /// preempts the least urgent worker.
    async fn dispatch(&self, workers: &mut Workers, slots: usize) -> Result<()> {
        loop {
            let running = self.control.running();
            let Some(task) = self.ctx.db.next_dispatchable(&running, unix_millis()).await? else {
                return Ok(());
            };
            if running.len() >= slots {
                preempt::preempt_for(&self.control, &task.hash, task.priority);
                return Ok(());
            }
            self.spawn_worker(workers, task);
        }
    }

    fn spawn_worker(&self, workers: &mut Workers, task: DownloadTask) {
        let hash = task.hash.clone();
        let signal = self.control.register(&hash, task.priority, &self.shutdown);
        tracing::debug!(
            track = %hash.short(),
            priority = task.priority,
            state = %task.state,
            generation = task.generation,
            "dispatching"
        );
        let ctx = Arc::clone(&self.ctx);
        let slot = SlotGuard::new(Arc::clone(&self.control), hash.clone());
        workers.spawn(async move {
            let _slot = slot;
            let outcome = AssertUnwindSafe(run_task(ctx, task, signal))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| TaskOutcome::Crashed(panic_message(&*panic)));
            (hash, outcome)
        });
    }

    /// Reap a finished worker. Its slot was already freed by its
    /// [`SlotGuard`], even if it was aborted. A crashed worker's task is
    /// settled as `Failed` with normal retry accounting.
    async fn settle(&self, joined: Result<(TrackHash, TaskOutcome), JoinError>) {
        let (hash, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(error = %e, "worker task did not complete");
                return;
            }
        };
        if let TaskOutcome::Crashed(reason) = &outcome {
            match settle_crash(&self.ctx, &hash, reason).await {
                Ok(settled) => tracing::warn!(track = %hash.short(), %reason, ?settled, "crashed worker settled"),
                Err(e) => tracing::error!(track = %hash.short(), error = %format!("{e:#}"), "could not settle crashed worker"),
            }
        }
    }

    /// Circuit breaker: hold dispatch for one backoff delay, then try to
    /// reconnect. Finished workers are still reaped while waiting. Returns
    /// `false` if shutdown was requested.
    async fn hold_for_reconnect(&self, backoff: &mut ReconnectBackoff, workers: &mut Workers) -> bool {
        let delay = backoff.next_delay();
        let attempt = backoff.attempts();
        let retry_at = unix_millis().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        self.set_connection(ConnectionStatus::Reconnecting { attempt, retry_at });
        tracing::warn!(attempt, retry_in_ms = delay.as_millis() as u64, "transport disconnected; dispatch held");
        self.ctx.events.emit(AcquisitionEvent::ConnectionLost {
            retry_in: delay,
            attempt,
        });

        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = &mut deadline => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => self.settle(joined).await,
            }
        }

        if let Err(e) = self.ctx.transport.reconnect().await {
            tracing::warn!(attempt, error = %e, "reconnect attempt failed");
        }
        true
    }

    /// Sleep until the next poll, or earlier if a soft retry comes due.
    async fn idle_wait(&self) -> Duration {
        let poll = self.ctx.config.poll_interval().max(MIN_WAIT);
        match self.ctx.db.next_retry_at().await {
            Ok(Some(at)) => {
                let until = at.saturating_sub(unix_millis());
                if until > 0 {
                    poll.min(Duration::from_millis(until as u64))
                } else {
                    poll
                }
            }
            _ => poll,
        }
    }

    async fn flush_peers(&self) {
        let peers = Arc::clone(&self.ctx.peers);
        match tokio::task::spawn_blocking(move || peers.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "peer health flush failed"),
            Err(e) => tracing::warn!(error = %e, "peer health flush task failed"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
