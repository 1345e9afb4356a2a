//! Map acquisition errors onto retry kinds and peer attribution.

use crate::peer_health::{FailureCause, PeerId};

use super::error::AcquisitionError;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout or disconnect: next candidate, then soft retry with backoff.
    Transient,
    /// Candidate rejected: next candidate, no peer penalty.
    Integrity,
    /// Local disk failure: retrying will not help.
    Io,
    /// No progress: back to `Pending` without spending retry budget.
    Stall,
    /// Unreadable journal entry: needs an operator.
    Corruption,
    Cancelled,
}

pub fn classify(err: &AcquisitionError) -> ErrorKind {
    match err {
        AcquisitionError::TransientNetwork { .. } => ErrorKind::Transient,
        AcquisitionError::IntegrityRejection { .. } => ErrorKind::Integrity,
        AcquisitionError::Io(_) => ErrorKind::Io,
        AcquisitionError::StallTimeout { .. } => ErrorKind::Stall,
        AcquisitionError::JournalCorruption(_) => ErrorKind::Corruption,
        AcquisitionError::Cancelled(_) => ErrorKind::Cancelled,
    }
}

/// The peer to penalize for this error, if the error is the peer's fault.
/// A stall counts as a disconnect-class failure.
pub fn peer_fault(err: &AcquisitionError) -> Option<(&PeerId, FailureCause)> {
    match err {
        AcquisitionError::TransientNetwork {
            peer: Some(peer),
            fault,
            ..
        } => Some((peer, fault.cause())),
        AcquisitionError::StallTimeout { peer, .. } => Some((peer, FailureCause::Stall)),
        _ => None,
    }
}
