//! Transport and acquisition error types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateId;
use crate::peer_health::{FailureCause, PeerId};

/// Network-level fault reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFault {
    Disconnect,
    Timeout,
    Refused,
}

impl NetworkFault {
    pub fn cause(self) -> FailureCause {
        match self {
            NetworkFault::Disconnect => FailureCause::Disconnect,
            NetworkFault::Timeout => FailureCause::Timeout,
            NetworkFault::Refused => FailureCause::Refused,
        }
    }
}

impl fmt::Display for NetworkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkFault::Disconnect => "disconnect",
            NetworkFault::Timeout => "timeout",
            NetworkFault::Refused => "refused",
        })
    }
}

/// Error returned by a transport search or transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{fault}: {message}")]
    Network { fault: NetworkFault, message: String },
    /// Writing the partial file failed (disk full, permission denied).
    #[error("local i/o: {0}")]
    Io(#[from] std::io::Error),
    /// The cancellation token fired before the transfer finished.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn network(fault: NetworkFault, message: impl Into<String>) -> Self {
        TransferError::Network {
            fault,
            message: message.into(),
        }
    }
}

/// Why a worker's token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Operator pause; the task stays resumable.
    Pause,
    /// Operator cancel; the task is dead-lettered.
    Cancel,
    /// A more urgent task needs the slot; the task is deferred.
    Preempt,
    /// Scheduler is shutting down; the task resumes on next start.
    Shutdown,
}

/// Per-task failure taxonomy. The variant decides the next task state.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// Timeout or disconnect. `peer` is `None` when the fault was not a
    /// specific peer's (e.g. a failed search).
    #[error("network {fault} ({}): {message}", .peer.as_ref().map_or("search", PeerId::as_str))]
    TransientNetwork {
        peer: Option<PeerId>,
        fault: NetworkFault,
        message: String,
    },
    /// The candidate is not what it claimed to be. Never retried for the
    /// same task generation.
    #[error("integrity rejection of {candidate}: {reason}")]
    IntegrityRejection { candidate: CandidateId, reason: String },
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("stalled on {peer}: no progress for {intervals} heartbeats")]
    StallTimeout { peer: PeerId, intervals: u32 },
    #[error("journal corruption: {0}")]
    JournalCorruption(String),
    #[error("cancelled ({0:?})")]
    Cancelled(CancelReason),
}

impl AcquisitionError {
    /// Lift a transport error for a transfer from `peer`. A cancelled
    /// transfer is attributed to `reason`, the reason the token was fired.
    pub fn from_transfer(err: TransferError, peer: &PeerId, reason: CancelReason) -> Self {
        match err {
            TransferError::Network { fault, message } => AcquisitionError::TransientNetwork {
                peer: Some(peer.clone()),
                fault,
                message,
            },
            TransferError::Io(e) => AcquisitionError::Io(e),
            TransferError::Cancelled => AcquisitionError::Cancelled(reason),
        }
    }
}
