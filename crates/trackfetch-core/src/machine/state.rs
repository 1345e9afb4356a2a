//! Task lifecycle states and the durable per-track task record.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateId;
use crate::peer_health::PeerId;
use crate::track::{TrackHash, TrackRequest};

/// Dispatch priority: lower is more urgent.
pub type Priority = u32;

/// Priority given by `HardRetry`: ahead of everything else.
pub const HARD_RETRY_PRIORITY: Priority = 0;

/// Priority used when the caller does not pick one.
pub const DEFAULT_PRIORITY: Priority = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Searching,
    CandidateSelected,
    Transferring,
    Completed,
    Failed,
    /// Dead-lettered: waits for an operator `HardRetry`.
    PermanentlyFailed,
    Paused,
    /// Gave up its worker slot to a more urgent task.
    Deferred,
}

impl TaskState {
    pub const ALL: [TaskState; 9] = [
        TaskState::Pending,
        TaskState::Searching,
        TaskState::CandidateSelected,
        TaskState::Transferring,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::PermanentlyFailed,
        TaskState::Paused,
        TaskState::Deferred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Searching => "searching",
            TaskState::CandidateSelected => "candidate_selected",
            TaskState::Transferring => "transferring",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::PermanentlyFailed => "permanently_failed",
            TaskState::Paused => "paused",
            TaskState::Deferred => "deferred",
        }
    }

    /// `Completed` and `PermanentlyFailed` end a task's active lifetime.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::PermanentlyFailed)
    }

    /// States that only exist while a worker owns the task.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskState::Searching | TaskState::CandidateSelected | TaskState::Transferring
        )
    }

    /// Whether the scheduler may hand this task to a worker.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Deferred)
    }

    /// Legal lifecycle edges. Staying in the same state is always allowed
    /// and is not an edge.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        if self == next {
            return true;
        }
        match self {
            Pending => matches!(
                next,
                Searching | CandidateSelected | Paused | Deferred | PermanentlyFailed
            ),
            Searching => matches!(
                next,
                CandidateSelected | Failed | Pending | Paused | Deferred | PermanentlyFailed
            ),
            CandidateSelected => matches!(
                next,
                Transferring | Searching | Failed | Pending | Paused | Deferred | PermanentlyFailed
            ),
            Transferring => matches!(
                next,
                Completed
                    | Searching
                    | Failed
                    | Pending
                    | Paused
                    | Deferred
                    | PermanentlyFailed
                    | CandidateSelected
            ),
            Failed => matches!(next, Pending | PermanentlyFailed),
            Paused => matches!(next, Pending | PermanentlyFailed),
            Deferred => matches!(
                next,
                Pending | Searching | CandidateSelected | Paused | PermanentlyFailed
            ),
            PermanentlyFailed => matches!(next, Pending),
            Completed => false,
        }
    }

    /// States from which `next` can be entered.
    pub fn predecessors(next: TaskState) -> Vec<TaskState> {
        Self::ALL
            .into_iter()
            .filter(|s| *s != next && s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task state {0:?}")]
pub struct UnknownTaskState(pub String);

impl FromStr for TaskState {
    type Err = UnknownTaskState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownTaskState(s.to_string()))
    }
}

/// Durable record for one track, keyed by its content hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadTask {
    pub hash: TrackHash,
    /// Bumped by `HardRetry`; journal entries from older generations are stale.
    pub generation: u32,
    pub state: TaskState,
    pub priority: Priority,
    pub request: TrackRequest,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    pub retry_count: u32,
    /// Unix ms before which a soft-retried task is not dispatched.
    pub retry_after: Option<i64>,
    /// Final path of the current (or completed) candidate.
    pub file_path: Option<PathBuf>,
    pub current_peer: Option<PeerId>,
    /// Candidates rejected for integrity in this generation.
    pub rejected: HashSet<CandidateId>,
    pub last_error: Option<String>,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_checkpoint_at: Option<i64>,
}

impl DownloadTask {
    /// Fraction of bytes received, if the size is known.
    pub fn progress(&self) -> Option<f64> {
        match self.bytes_total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_done as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}
