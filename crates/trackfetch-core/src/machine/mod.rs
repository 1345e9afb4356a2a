//! Per-track download state machine.
//!
//! One worker drives one `DownloadTask` from dispatch to its next resting
//! state: resume from the journal if possible, otherwise search, rank, and
//! walk the ranked list until a transfer verifies or the list runs out.
//! Every failure is translated into a state transition here; nothing a
//! single task does can take down the scheduler.

mod finish;
mod monitor;
mod state;
mod transfer;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinSet;

use crate::candidate::SearchCandidate;
use crate::config::TrackfetchConfig;
use crate::journal::JournalStore;
use crate::peer_health::{PeerHealthStore, PeerId};
use crate::ranking::RankingEngine;
use crate::retry::{classify, AcquisitionError, ErrorKind, RetryDecision, RetryPolicy, TransferError};
use crate::scheduler::{AcquisitionEvent, CancelSignal, EventBus};
use crate::task_db::{unix_millis, TaskDb};
use crate::transport::{Transport, VerificationHook};
use transfer::Resume;

pub use finish::settle_crash;
pub use state::{
    DownloadTask, Priority, TaskState, UnknownTaskState, DEFAULT_PRIORITY, HARD_RETRY_PRIORITY,
};

/// Shared, read-only dependencies of every worker.
pub struct WorkerContext {
    pub config: TrackfetchConfig,
    pub db: TaskDb,
    pub journal: Arc<dyn JournalStore>,
    pub peers: Arc<dyn PeerHealthStore>,
    pub transport: Arc<dyn Transport>,
    pub verifier: Option<Arc<dyn VerificationHook>>,
    pub ranking: RankingEngine,
    pub retry: RetryPolicy,
    pub events: EventBus,
    pub download_dir: PathBuf,
    /// Verification checks that outlive the worker that started them.
    background: Mutex<JoinSet<()>>,
}

impl WorkerContext {
    /// Context with the journal in `db`, ranking and retry policy from
    /// `config`, and no verification hook.
    pub fn new(
        config: TrackfetchConfig,
        db: TaskDb,
        transport: Arc<dyn Transport>,
        peers: Arc<dyn PeerHealthStore>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            journal: Arc::new(db.clone()),
            ranking: RankingEngine::new(config.ranking.clone()),
            retry: RetryPolicy::from_config(&config.retry),
            events: EventBus::default(),
            verifier: None,
            config,
            db,
            peers,
            transport,
            download_dir,
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_verifier(mut self, hook: Arc<dyn VerificationHook>) -> Self {
        self.verifier = Some(hook);
        self
    }

    fn spawn_background<F>(&self, job: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap whatever already finished so the set does not grow unbounded.
        while let Some(Some(_)) = jobs.join_next().now_or_never() {}
        jobs.spawn(job);
    }

    /// Wait for every background check still running. Called on shutdown so
    /// a pending review flag is not lost.
    pub async fn drain_background(&self) {
        let mut jobs = std::mem::take(&mut *self.background.lock().unwrap_or_else(PoisonError::into_inner));
        if !jobs.is_empty() {
            tracing::debug!(pending = jobs.len(), "waiting for background verification");
        }
        while let Some(joined) = jobs.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "background verification did not complete");
            }
        }
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("download_dir", &self.download_dir)
            .field("verifier", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Where a worker left its task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { path: PathBuf },
    /// Soft retry scheduled; dispatchable again after the delay.
    Retrying { after: Duration },
    DeadLettered { reason: String },
    Paused,
    Deferred,
    /// Force-aborted for lack of progress; back in `Pending`.
    Stalled,
    /// Scheduler shutdown; back in `Pending`, journal kept for resume.
    Interrupted,
    /// The row changed underneath the worker (operator command or a new
    /// generation); the worker stepped aside.
    Superseded,
    /// Unexpected internal failure (database error, panic).
    Crashed(String),
}

/// The task row no longer matches what this worker expected.
#[derive(Debug, thiserror::Error)]
#[error("task changed underneath its worker")]
pub(crate) struct Superseded;

/// Drive `task` until it reaches a resting state. Never fails: internal
/// errors are reported as `TaskOutcome::Crashed` for the scheduler to clean
/// up.
pub async fn run_task(ctx: Arc<WorkerContext>, task: DownloadTask, cancel: CancelSignal) -> TaskOutcome {
    let hash = task.hash.clone();
    let mut worker = Worker { ctx, task, cancel };
    match worker.drive().await {
        Ok(outcome) => {
            tracing::debug!(track = %hash.short(), ?outcome, "worker finished");
            outcome
        }
        Err(err) if err.is::<Superseded>() => {
            tracing::info!(track = %hash.short(), "task changed by another actor; worker stopping");
            TaskOutcome::Superseded
        }
        Err(err) => {
            tracing::error!(track = %hash.short(), error = %format!("{err:#}"), "worker failed");
            TaskOutcome::Crashed(format!("{err:#}"))
        }
    }
}

/// Result of one candidate attempt.
pub(crate) enum Step {
    /// The task reached a resting state.
    Done(TaskOutcome),
    /// This candidate failed; try the next one.
    Next(AcquisitionError),
}

pub(crate) struct Worker {
    ctx: Arc<WorkerContext>,
    task: DownloadTask,
    cancel: CancelSignal,
}

impl Worker {
    async fn drive(&mut self) -> Result<TaskOutcome> {
        let mut last_error = None;

        match self.resume_plan().await? {
            Resume::Fresh => {}
            Resume::Corrupt(reason) => return self.corrupt_journal(reason).await,
            Resume::From {
                candidate,
                final_path,
                offset,
            } => match self.attempt(&candidate, final_path, offset).await? {
                Step::Done(outcome) => return Ok(outcome),
                Step::Next(err) => last_error = Some(err),
            },
        }

        self.transition(TaskState::Searching, None).await?;
        let candidates = match self.search().await {
            Ok(candidates) => candidates,
            Err(err) => return self.search_failed(err).await,
        };

        let peers: Vec<PeerId> = candidates.iter().map(|c| c.peer.clone()).collect();
        let signals = self.ctx.peers.signals(&peers);
        let outcome = self
            .ctx
            .ranking
            .rank(&self.task.request, candidates, &signals, &self.task.rejected);
        tracing::info!(
            track = %self.task.hash.short(),
            ranked = outcome.ranked.len(),
            excluded = outcome.excluded.len(),
            "candidates ranked"
        );

        let limit = self.ctx.config.max_candidates_per_attempt.max(1);
        for ranked in outcome.ranked.into_iter().take(limit) {
            // Another worker may have blacklisted the peer since ranking.
            if self.ctx.peers.is_blacklisted(&ranked.candidate.peer) {
                continue;
            }
            let final_path = crate::storage::final_path_for(
                &self.ctx.download_dir,
                &self.task.request,
                &ranked.candidate,
            );
            match self.attempt(&ranked.candidate, final_path, 0).await? {
                Step::Done(outcome) => return Ok(outcome),
                Step::Next(err) => last_error = Some(err),
            }
        }

        self.exhausted(last_error).await
    }

    /// Move the task `from → to`, emitting a state-change event. Fails with
    /// `Superseded` when the row no longer matches.
    async fn transition(&mut self, to: TaskState, error: Option<&str>) -> Result<()> {
        let from = self.task.state;
        if from == to {
            return Ok(());
        }
        let applied = self
            .ctx
            .db
            .transition(&self.task.hash, self.task.generation, from, to, error)
            .await?;
        if !applied {
            return Err(Superseded.into());
        }
        tracing::info!(track = %self.task.hash.short(), %from, %to, "task state");
        self.task.state = to;
        self.ctx.events.emit(AcquisitionEvent::StateChanged {
            hash: self.task.hash.clone(),
            from,
            to,
        });
        Ok(())
    }

    /// Collect candidates until the search timeout or the stream ends.
    async fn search(&self) -> Result<Vec<SearchCandidate>, AcquisitionError> {
        let query = self.task.request.query();
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AcquisitionError::Cancelled(self.cancel.reason())),
            res = self.ctx.transport.search(&query) => res,
        };
        let mut stream = opened.map_err(|err| self.search_error(err))?;

        let mut found = Vec::new();
        let deadline = tokio::time::sleep(self.ctx.config.search_timeout());
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(AcquisitionError::Cancelled(self.cancel.reason()));
                }
                _ = &mut deadline => break,
                next = stream.next() => match next {
                    Some(candidate) => found.push(candidate),
                    None => break,
                },
            }
        }
        tracing::debug!(track = %self.task.hash.short(), %query, results = found.len(), "search finished");
        Ok(found)
    }

    fn search_error(&self, err: TransferError) -> AcquisitionError {
        match err {
            TransferError::Network { fault, message } => AcquisitionError::TransientNetwork {
                peer: None,
                fault,
                message,
            },
            TransferError::Io(e) => AcquisitionError::Io(e),
            TransferError::Cancelled => AcquisitionError::Cancelled(self.cancel.reason()),
        }
    }

    async fn search_failed(&mut self, err: AcquisitionError) -> Result<TaskOutcome> {
        match err {
            AcquisitionError::Cancelled(reason) => self.settle_cancel(reason, None).await,
            AcquisitionError::Io(e) => {
                let reason = format!("i/o failure during search: {e}");
                self.transition(TaskState::Failed, Some(&reason)).await?;
                self.dead_letter(&reason).await
            }
            other => {
                tracing::warn!(track = %self.task.hash.short(), error = %other, "search failed");
                self.exhausted(Some(other)).await
            }
        }
    }

    /// No candidate worked this round: `Failed`, then a delayed soft retry
    /// or the dead-letter list.
    async fn exhausted(&mut self, last_error: Option<AcquisitionError>) -> Result<TaskOutcome> {
        let reason = last_error
            .as_ref()
            .map_or_else(|| "no acceptable candidates".to_string(), ToString::to_string);
        let kind = last_error.as_ref().map_or(ErrorKind::Transient, classify);
        self.transition(TaskState::Failed, Some(&reason)).await?;

        let attempt = self.task.retry_count.saturating_add(1);
        let decision = self.ctx.retry.decide(attempt, kind);
        // The next round starts from a fresh search.
        self.ctx.journal.abort(&self.task.hash, &reason).await?;

        match decision {
            RetryDecision::RetryAfter(delay) => {
                let at = unix_millis().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
                self.ctx
                    .db
                    .set_retry(&self.task.hash, self.task.generation, attempt, Some(at))
                    .await?;
                self.task.retry_count = attempt;
                self.task.retry_after = Some(at);
                tracing::info!(
                    track = %self.task.hash.short(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "soft retry scheduled"
                );
                self.transition(TaskState::Pending, None).await?;
                Ok(TaskOutcome::Retrying { after: delay })
            }
            RetryDecision::NoRetry => {
                self.ctx
                    .db
                    .set_retry(&self.task.hash, self.task.generation, attempt, None)
                    .await?;
                self.task.retry_count = attempt;
                self.dead_letter(&reason).await
            }
        }
    }
}
