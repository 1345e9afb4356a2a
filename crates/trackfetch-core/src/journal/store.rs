use anyhow::Result;
use async_trait::async_trait;

use crate::track::TrackHash;

use super::types::{CheckpointOutcome, JournalEntry, JournalRecord};

/// Durable checkpoint log keyed by track hash.
///
/// Per hash the write sequence is `prepare → checkpoint* → commit | abort`.
/// Implementations must be safe to share across workers.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Record intent to transfer. Replaces any earlier entry for the hash.
    async fn prepare(&self, entry: &JournalEntry) -> Result<()>;

    /// Advance the checkpoint offset of an in-flight entry of `generation`.
    async fn checkpoint(
        &self,
        hash: &TrackHash,
        generation: u32,
        offset: u64,
    ) -> Result<CheckpointOutcome>;

    /// Remove the entry after success. Idempotent: returns `false` when there
    /// was nothing to remove.
    async fn commit(&self, hash: &TrackHash) -> Result<bool>;

    /// Close the entry as failed, keeping it with `reason`.
    async fn abort(&self, hash: &TrackHash, reason: &str) -> Result<bool>;

    async fn get(&self, hash: &TrackHash) -> Result<Option<JournalRecord>>;

    /// Every entry, in no particular order.
    async fn load(&self) -> Result<Vec<JournalRecord>>;

    /// Drop a stale entry (older generation, or no matching task).
    async fn invalidate(&self, hash: &TrackHash) -> Result<bool>;
}
