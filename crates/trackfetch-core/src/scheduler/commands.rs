//! Operator commands: enqueue, pause, resume, cancel, hard retry.
//!
//! Running tasks are reached through their worker's cancellation token and
//! settle themselves; idle tasks are moved directly in the database.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Notify;

use super::control::TaskControl;
use super::{AcquisitionEvent, EventBus, Scheduler};
use crate::journal::{JournalRecord, JournalStore};
use crate::machine::{DownloadTask, Priority, TaskState};
use crate::retry::CancelReason;
use crate::storage;
use crate::task_db::{EnqueueOutcome, TaskDb};
use crate::track::{TrackHash, TrackRequest};

/// What a command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandAck {
    /// The task was moved directly.
    Applied { from: TaskState, to: TaskState },
    /// The task's running worker was asked to act; it settles the state.
    Signalled,
    /// Not applicable in the task's current state.
    Unchanged { state: TaskState },
    UnknownTask,
}

/// Command surface over the durable queue. Built from a running
/// `Scheduler` (workers are signalled, dispatch is woken) or standalone
/// over a database for offline administration.
#[derive(Clone)]
pub struct QueueCommands {
    db: TaskDb,
    journal: Arc<dyn JournalStore>,
    events: EventBus,
    control: Option<Arc<TaskControl>>,
    wake: Option<Arc<Notify>>,
}

impl Scheduler {
    pub fn commands(&self) -> QueueCommands {
        QueueCommands {
            db: self.ctx.db.clone(),
            journal: Arc::clone(&self.ctx.journal),
            events: self.ctx.events.clone(),
            control: Some(Arc::clone(&self.control)),
            wake: Some(Arc::clone(&self.wake)),
        }
    }
}

impl QueueCommands {
    /// Commands against the database alone. Tasks owned by a worker in
    /// another process are reported `Unchanged`.
    pub fn offline(db: TaskDb) -> Self {
        Self {
            journal: Arc::new(db.clone()),
            db,
            events: EventBus::default(),
            control: None,
            wake: None,
        }
    }

    pub fn db(&self) -> &TaskDb {
        &self.db
    }

    /// Queue `request`. Re-enqueueing a completed track is a no-op;
    /// re-enqueueing a waiting one can only raise its priority.
    pub async fn enqueue(&self, request: &TrackRequest, priority: Priority) -> Result<EnqueueOutcome> {
        let outcome = self.db.enqueue(request, priority).await?;
        tracing::info!(
            track = %request.hash().short(),
            artist = %request.artist,
            title = %request.title,
            priority,
            ?outcome,
            "enqueue"
        );
        if !matches!(outcome, EnqueueOutcome::Unchanged { .. }) {
            self.wake();
        }
        Ok(outcome)
    }

    /// Pause a task. A transferring worker writes a final checkpoint; the
    /// task stays resumable.
    pub async fn pause(&self, hash: &TrackHash) -> Result<CommandAck> {
        if self.signal(hash, CancelReason::Pause) {
            return Ok(CommandAck::Signalled);
        }
        let Some(task) = self.db.get_task(hash).await? else {
            return Ok(CommandAck::UnknownTask);
        };
        match task.state {
            TaskState::Pending | TaskState::Deferred => self.apply(&task, TaskState::Paused, None).await,
            state => Ok(CommandAck::Unchanged { state }),
        }
    }

    pub async fn resume(&self, hash: &TrackHash) -> Result<CommandAck> {
        let Some(task) = self.db.get_task(hash).await? else {
            return Ok(CommandAck::UnknownTask);
        };
        if task.state != TaskState::Paused {
            return Ok(CommandAck::Unchanged { state: task.state });
        }
        let ack = self.apply(&task, TaskState::Pending, None).await?;
        self.wake();
        Ok(ack)
    }

    /// Cancel a task: journal abort, then the dead-letter list with reason
    /// `cancelled`. `hard_retry` revives it.
    pub async fn cancel(&self, hash: &TrackHash) -> Result<CommandAck> {
        if self.signal(hash, CancelReason::Cancel) {
            return Ok(CommandAck::Signalled);
        }
        let Some(task) = self.db.get_task(hash).await? else {
            return Ok(CommandAck::UnknownTask);
        };
        match task.state {
            TaskState::Pending | TaskState::Deferred | TaskState::Paused | TaskState::Failed => {
                self.journal.abort(hash, "cancelled").await?;
                let ack = self
                    .apply(&task, TaskState::PermanentlyFailed, Some("cancelled"))
                    .await?;
                if matches!(ack, CommandAck::Applied { .. }) {
                    self.events.emit(AcquisitionEvent::DeadLettered {
                        hash: hash.clone(),
                        reason: "cancelled".to_string(),
                    });
                }
                Ok(ack)
            }
            state => Ok(CommandAck::Unchanged { state }),
        }
    }

    /// Start the task over as a new generation at maximum priority: partial
    /// output deleted, retry budget and rejected candidates cleared, any
    /// journal entry of the old generation purged.
    pub async fn hard_retry(&self, hash: &TrackHash) -> Result<CommandAck> {
        let Some(task) = self.db.get_task(hash).await? else {
            return Ok(CommandAck::UnknownTask);
        };
        let running = self.control.as_ref().is_some_and(|c| c.is_running(hash));
        if running || task.state == TaskState::Completed || task.state.is_active() {
            return Ok(CommandAck::Unchanged { state: task.state });
        }

        let mut temps: Vec<PathBuf> = task.file_path.iter().map(|p| storage::temp_path(p)).collect();
        if let Some(JournalRecord::Valid(entry)) = self.journal.get(hash).await? {
            if !temps.contains(&entry.snapshot.temp_path) {
                temps.push(entry.snapshot.temp_path);
            }
        }
        for temp in &temps {
            if let Err(e) = storage::discard_partial(temp).await {
                tracing::warn!(track = %hash.short(), path = %temp.display(), error = %e, "could not delete partial output");
            }
        }
        let Some(generation) = self.db.reset_for_hard_retry(hash).await? else {
            return Ok(CommandAck::Unchanged { state: task.state });
        };
        tracing::info!(track = %hash.short(), generation, from = %task.state, "hard retry");
        self.events.emit(AcquisitionEvent::StateChanged {
            hash: hash.clone(),
            from: task.state,
            to: TaskState::Pending,
        });
        self.wake();
        Ok(CommandAck::Applied {
            from: task.state,
            to: TaskState::Pending,
        })
    }

    pub async fn dead_letters(&self) -> Result<Vec<DownloadTask>> {
        self.db.dead_letters().await
    }

    pub async fn task(&self, hash: &TrackHash) -> Result<Option<DownloadTask>> {
        self.db.get_task(hash).await
    }

    pub async fn tasks(&self) -> Result<Vec<DownloadTask>> {
        self.db.list_tasks().await
    }

    async fn apply(&self, task: &DownloadTask, to: TaskState, error: Option<&str>) -> Result<CommandAck> {
        let applied = self
            .db
            .transition(&task.hash, task.generation, task.state, to, error)
            .await?;
        if !applied {
            // Raced with a worker or another command; report what is there now.
            let state = self
                .db
                .get_task(&task.hash)
                .await?
                .map_or(task.state, |t| t.state);
            return Ok(CommandAck::Unchanged { state });
        }
        tracing::info!(track = %task.hash.short(), from = %task.state, %to, "task state (operator)");
        self.events.emit(AcquisitionEvent::StateChanged {
            hash: task.hash.clone(),
            from: task.state,
            to,
        });
        Ok(CommandAck::Applied { from: task.state, to })
    }

    fn signal(&self, hash: &TrackHash, reason: CancelReason) -> bool {
        self.control.as_ref().is_some_and(|c| c.signal(hash, reason))
    }

    fn wake(&self) {
        if let Some(wake) = &self.wake {
            wake.notify_one();
        }
    }
}

impl std::fmt::Debug for QueueCommands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueCommands")
            .field("online", &self.control.is_some())
            .finish_non_exhaustive()
    }
}
