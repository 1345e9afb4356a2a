//! Per-peer health record and the ranking-facing signal derived from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::PeerId;

/// Why a transfer failed, when the failure is the peer's fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Disconnect,
    Timeout,
    Refused,
    /// Accepted the transfer but stopped delivering bytes.
    Stall,
}

/// Durable per-peer reliability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerHealthRecord {
    pub peer: PeerId,
    pub consecutive_failures: u32,
    pub successes: u64,
    pub failures: u64,
    pub blacklisted: bool,
    /// Unix milliseconds when the peer was blacklisted.
    #[serde(default)]
    pub blacklisted_at: Option<i64>,
    #[serde(default)]
    pub last_failure: Option<FailureCause>,
}

impl PeerHealthRecord {
    pub(super) fn new(peer: PeerId) -> Self {
        Self {
            peer,
            consecutive_failures: 0,
            successes: 0,
            failures: 0,
            blacklisted: false,
            blacklisted_at: None,
            last_failure: None,
        }
    }

    /// Fraction of attempts that failed; 0.0 for a peer with no history.
    pub fn failure_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }

    pub fn signal(&self) -> PeerSignal {
        PeerSignal {
            blacklisted: self.blacklisted,
            failure_rate: self.failure_rate(),
        }
    }
}

/// What ranking needs to know about a peer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeerSignal {
    pub blacklisted: bool,
    pub failure_rate: f64,
}

/// Worker-local snapshot of peer signals for one ranking pass. Peers absent
/// from the snapshot are treated as healthy and unknown.
#[derive(Debug, Clone, Default)]
pub struct PeerSignals {
    signals: HashMap<PeerId, PeerSignal>,
}

impl PeerSignals {
    pub fn insert(&mut self, peer: PeerId, signal: PeerSignal) {
        self.signals.insert(peer, signal);
    }

    pub fn is_blacklisted(&self, peer: &PeerId) -> bool {
        self.signals.get(peer).is_some_and(|s| s.blacklisted)
    }

    pub fn failure_rate(&self, peer: &PeerId) -> f64 {
        self.signals.get(peer).map_or(0.0, |s| s.failure_rate)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
