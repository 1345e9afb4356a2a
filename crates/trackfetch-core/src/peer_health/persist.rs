//! Persist peer health to disk (JSON under the XDG state dir) so blacklists
//! survive restarts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::entry::PeerHealthRecord;
use super::state::PeerHealthTracker;
use super::store::PeerHealthStore;
use crate::storage;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedPeerHealth {
    version: u32,
    peers: Vec<PeerHealthRecord>,
}

impl PeerHealthTracker {
    /// Default path: `~/.local/state/trackfetch/peer_health.json`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::config::state_dir()?.join("peer_health.json"))
    }

    /// Write every record atomically (temp file, fsync, rename).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let snapshot = self.take_snapshot();
        self.write_snapshot(path, &snapshot)
    }

    /// Clear the dirty flag, then copy the records. An update racing with
    /// the copy sets the flag again, so the next flush picks it up.
    fn take_snapshot(&self) -> PersistedPeerHealth {
        self.mark_clean();
        PersistedPeerHealth {
            version: SNAPSHOT_VERSION,
            peers: self.records(),
        }
    }

    fn write_snapshot(&self, path: &Path, snapshot: &PersistedPeerHealth) -> Result<()> {
        let written = serde_json::to_vec_pretty(snapshot)
            .context("serialize peer health")
            .and_then(|json| {
                storage::write_atomic(path, &json)
                    .with_context(|| format!("write peer health: {}", path.display()))
            });
        if let Err(e) = written {
            self.mark_dirty();
            return Err(e);
        }
        tracing::debug!(path = %path.display(), peers = snapshot.peers.len(), "peer health flushed");
        Ok(())
    }

    /// Load records from `path`. A missing file yields `None`. The threshold
    /// comes from the caller so config always wins; existing blacklist flags
    /// are kept as recorded.
    pub fn load_from_path(path: &Path, blacklist_threshold: u32) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read peer health: {}", path.display()))
            }
        };
        let snapshot: PersistedPeerHealth = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse peer health: {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "unsupported peer health version {} in {}",
                snapshot.version,
                path.display()
            );
        }
        Ok(Some(Self::from_records(snapshot.peers, blacklist_threshold)))
    }

    /// Load from `path` (or start empty) and flush back to it.
    pub fn open(path: impl Into<PathBuf>, blacklist_threshold: u32) -> Result<Self> {
        let path = path.into();
        let tracker = Self::load_from_path(&path, blacklist_threshold)?
            .unwrap_or_else(|| Self::new(blacklist_threshold));
        Ok(tracker.with_persist_path(path))
    }
}
