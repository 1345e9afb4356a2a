//! Seam between workers and peer health persistence.

use anyhow::Result;

use super::entry::{FailureCause, PeerHealthRecord, PeerSignals};
use super::PeerId;

/// Shared peer reliability store. Every worker holds the same instance, so
/// implementations must serialize concurrent updates to the same peer.
pub trait PeerHealthStore: Send + Sync {
    fn record_success(&self, peer: &PeerId);

    /// Returns `true` if the peer is blacklisted after this failure.
    fn record_failure(&self, peer: &PeerId, cause: FailureCause) -> bool;

    fn get(&self, peer: &PeerId) -> Option<PeerHealthRecord>;

    fn is_blacklisted(&self, peer: &PeerId) -> bool {
        self.get(peer).is_some_and(|r| r.blacklisted)
    }

    /// Snapshot of the given peers for one ranking pass.
    fn signals(&self, peers: &[PeerId]) -> PeerSignals;

    /// Operator reset: forget everything known about `peer`, including a
    /// blacklist. Returns whether a record existed.
    fn clear(&self, peer: &PeerId) -> bool;

    /// All records, ordered by peer.
    fn records(&self) -> Vec<PeerHealthRecord>;

    /// Write pending changes to durable storage.
    fn flush(&self) -> Result<()>;
}
