//! State-change and progress event stream for callers.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use super::progress::ProgressStats;
use crate::machine::TaskState;
use crate::track::TrackHash;

/// Everything the engine reports to its embedding application, keyed by
/// track hash where one applies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AcquisitionEvent {
    StateChanged {
        hash: TrackHash,
        from: TaskState,
        to: TaskState,
    },
    Progress {
        hash: TrackHash,
        stats: ProgressStats,
    },
    /// Completed, but the verification hook did not pass it.
    NeedsReview { hash: TrackHash, reason: String },
    /// Moved to the dead-letter list.
    DeadLettered { hash: TrackHash, reason: String },
    /// Transport is down; dispatch is held until the next reconnect attempt.
    ConnectionLost { retry_in: Duration, attempt: u32 },
    Reconnected,
}

/// Fan-out of engine events. Sending never blocks; slow subscribers see
/// `RecvError::Lagged` instead of stalling workers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AcquisitionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AcquisitionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
