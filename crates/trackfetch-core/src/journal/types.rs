use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::candidate::SearchCandidate;
use crate::machine::Priority;
use crate::track::{TrackHash, TrackRequest};

/// Where an entry is in `prepare → checkpoint* → commit | abort`.
/// Committed entries are deleted, so there is no committed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalPhase {
    Prepare,
    Checkpoint,
    /// Kept with a failure reason for dead-letter inspection.
    Aborted,
}

impl JournalPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalPhase::Prepare => "prepare",
            JournalPhase::Checkpoint => "checkpoint",
            JournalPhase::Aborted => "aborted",
        }
    }

    /// Prepare or checkpoint: a transfer was in flight.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JournalPhase::Prepare | JournalPhase::Checkpoint)
    }
}

impl fmt::Display for JournalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepare" => Ok(JournalPhase::Prepare),
            "checkpoint" => Ok(JournalPhase::Checkpoint),
            "aborted" => Ok(JournalPhase::Aborted),
            other => Err(format!("unknown journal phase {other:?}")),
        }
    }
}

/// Everything a worker needs to resume a transfer without searching again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub request: TrackRequest,
    pub candidate: SearchCandidate,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    pub priority: Priority,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub hash: TrackHash,
    pub generation: u32,
    pub phase: JournalPhase,
    /// Bytes durably present in the temp file at the last checkpoint.
    pub offset: u64,
    /// Unix ms of the last prepare/checkpoint write.
    pub heartbeat_at: i64,
    pub snapshot: TaskSnapshot,
    pub failure_reason: Option<String>,
    pub created_at: i64,
}

impl JournalEntry {
    /// A fresh `prepare` entry for a transfer starting at `offset`.
    pub fn prepare(
        hash: TrackHash,
        generation: u32,
        offset: u64,
        snapshot: TaskSnapshot,
        now: i64,
    ) -> Self {
        Self {
            hash,
            generation,
            phase: JournalPhase::Prepare,
            offset,
            heartbeat_at: now,
            snapshot,
            failure_reason: None,
            created_at: now,
        }
    }
}

/// One row as read back at startup. A corrupt row does not stop the rest of
/// the journal from loading.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalRecord {
    Valid(JournalEntry),
    Corrupt { hash: TrackHash, reason: String },
}

impl JournalRecord {
    pub fn hash(&self) -> &TrackHash {
        match self {
            JournalRecord::Valid(entry) => &entry.hash,
            JournalRecord::Corrupt { hash, .. } => hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Written,
    /// No in-flight entry for this generation: a newer generation replaced it
    /// or the entry was already closed.
    Superseded,
}
