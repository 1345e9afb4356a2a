//! In-memory peer health tracker with per-peer locking.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::Result;

use super::entry::{FailureCause, PeerHealthRecord, PeerSignals};
use super::store::PeerHealthStore;
use super::PeerId;
use crate::task_db::unix_millis;

/// Shared peer table. The outer map lock is only held to find or insert a
/// peer; updates take that peer's own lock, so workers reporting on different
/// peers never contend.
#[derive(Debug)]
pub struct PeerHealthTracker {
    pub(super) records: RwLock<HashMap<PeerId, Arc<Mutex<PeerHealthRecord>>>>,
    pub(super) blacklist_threshold: u32,
    pub(super) persist_path: Option<PathBuf>,
    dirty: AtomicBool,
}

impl PeerHealthTracker {
    /// New empty tracker; a peer is blacklisted after `blacklist_threshold`
    /// consecutive peer-attributable failures.
    pub fn new(blacklist_threshold: u32) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            blacklist_threshold: blacklist_threshold.max(1),
            persist_path: None,
            dirty: AtomicBool::new(false),
        }
    }

    /// Flush target for `PeerHealthStore::flush`.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    pub(super) fn from_records(
        records: impl IntoIterator<Item = PeerHealthRecord>,
        blacklist_threshold: u32,
    ) -> Self {
        let tracker = Self::new(blacklist_threshold);
        {
            let mut map = tracker.records.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                map.insert(record.peer.clone(), Arc::new(Mutex::new(record)));
            }
        }
        tracker
    }

    fn entry(&self, peer: &PeerId) -> Arc<Mutex<PeerHealthRecord>> {
        if let Some(existing) = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
        {
            return Arc::clone(existing);
        }
        let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(peer.clone())
                .or_insert_with(|| Arc::new(Mutex::new(PeerHealthRecord::new(peer.clone())))),
        )
    }

    pub(super) fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub(super) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(super) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

impl PeerHealthStore for PeerHealthTracker {
    fn record_success(&self, peer: &PeerId) {
        let entry = self.entry(peer);
        let mut record = entry.lock().unwrap_or_else(PoisonError::into_inner);
        record.successes = record.successes.saturating_add(1);
        record.consecutive_failures = 0;
        self.dirty.store(true, Ordering::Release);
    }

    fn record_failure(&self, peer: &PeerId, cause: FailureCause) -> bool {
        let entry = self.entry(peer);
        let mut record = entry.lock().unwrap_or_else(PoisonError::into_inner);
        record.failures = record.failures.saturating_add(1);
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure = Some(cause);
        if !record.blacklisted && record.consecutive_failures >= self.blacklist_threshold {
            record.blacklisted = true;
            record.blacklisted_at = Some(unix_millis());
            tracing::warn!(
                peer = %peer,
                failures = record.consecutive_failures,
                ?cause,
                "peer blacklisted"
            );
        }
        self.dirty.store(true, Ordering::Release);
        record.blacklisted
    }

    fn get(&self, peer: &PeerId) -> Option<PeerHealthRecord> {
        let map = self.records.read().unwrap_or_else(PoisonError::into_inner);
        map.get(peer)
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn signals(&self, peers: &[PeerId]) -> PeerSignals {
        let map = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut signals = PeerSignals::default();
        for peer in peers {
            if let Some(entry) = map.get(peer) {
                let record = entry.lock().unwrap_or_else(PoisonError::into_inner);
                signals.insert(peer.clone(), record.signal());
            }
        }
        signals
    }

    fn clear(&self, peer: &PeerId) -> bool {
        let removed = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer)
            .is_some();
        if removed {
            tracing::info!(peer = %peer, "peer health record cleared");
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    fn records(&self) -> Vec<PeerHealthRecord> {
        let map = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = map
            .values()
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        out.sort_by(|a, b| a.peer.cmp(&b.peer));
        out
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = self.persist_path.as_deref() else {
            return Ok(());
        };
        if !self.is_dirty() {
            return Ok(());
        }
        self.save_to_path(path)
    }
}

#[cfg(test)]
mod tests;
