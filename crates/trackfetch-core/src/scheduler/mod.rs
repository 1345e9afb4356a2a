//! Queue scheduler.
//!
//! Owns the bounded worker pool. Dispatches `Pending`/`Deferred` tasks in
//! priority order, never two workers for one track hash, and holds all
//! dispatch while the transport is disconnected (circuit breaker with
//! capped exponential backoff on reconnect attempts). Operator commands
//! reach running workers through their cancellation tokens.

mod commands;
mod control;
mod events;
mod preempt;
mod progress;
mod run;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use crate::machine::WorkerContext;
use crate::track::TrackHash;

pub use commands::{CommandAck, QueueCommands};
pub use control::{CancelSignal, TaskControl};
pub use events::{AcquisitionEvent, EventBus};
pub use progress::ProgressStats;

/// Transport state as the scheduler last saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    /// Dispatch is held; the next reconnect attempt is at `retry_at`
    /// (unix ms).
    Reconnecting { attempt: u32, retry_at: i64 },
}

/// Point-in-time view for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub connection: ConnectionStatus,
    pub running: Vec<TrackHash>,
    pub slots: usize,
}

/// Cheap to clone; clones share the pool, the registry of running workers,
/// and the shutdown token.
#[derive(Debug, Clone)]
pub struct Scheduler {
    ctx: Arc<WorkerContext>,
    control: Arc<TaskControl>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    connection: Arc<Mutex<ConnectionStatus>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self {
            ctx,
            control: Arc::new(TaskControl::new()),
            wake: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            connection: Arc::new(Mutex::new(ConnectionStatus::Connected)),
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.ctx.events.subscribe()
    }

    /// Stop dispatching and ask every worker to park its task. `run`
    /// returns once all workers have exited.
    pub fn shutdown(&self) {
        tracing::info!(running = self.control.len(), "scheduler shutting down");
        self.shutdown.cancel();
    }

    pub fn status(&self) -> SchedulerStatus {
        let mut running: Vec<_> = self.control.running().into_iter().collect();
        running.sort();
        SchedulerStatus {
            connection: *self.connection.lock().unwrap_or_else(PoisonError::into_inner),
            running,
            slots: self.ctx.config.worker_slots(),
        }
    }

    fn set_connection(&self, status: ConnectionStatus) {
        *self.connection.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}
