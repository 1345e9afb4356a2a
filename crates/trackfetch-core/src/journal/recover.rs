//! Startup reconciliation of the task table against the journal.

use anyhow::Result;
use serde::Serialize;

use crate::machine::TaskState;
use crate::task_db::TaskDb;
use crate::track::TrackHash;

use super::store::JournalStore;
use super::types::JournalRecord;

/// What startup recovery did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryReport {
    /// Tasks with a valid in-flight entry; their workers resume from the
    /// checkpoint instead of searching again.
    pub resumable: Vec<TrackHash>,
    /// Worker-owned tasks reset to `Pending`.
    pub reset: u64,
    /// Entries from an older generation or for an unknown task, removed.
    pub stale: Vec<TrackHash>,
    /// Entries for tasks that had already completed, committed.
    pub committed: Vec<TrackHash>,
    /// Unreadable entries; their tasks were dead-lettered.
    pub corrupt: Vec<(TrackHash, String)>,
}

/// Reconcile after a crash or restart. Must run before any worker starts.
///
/// A corrupt entry only affects its own task: that task is dead-lettered and
/// the rest of the journal is processed normally.
pub async fn recover(db: &TaskDb, journal: &dyn JournalStore) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for record in journal.load().await? {
        match record {
            JournalRecord::Corrupt { hash, reason } => {
                let message = format!("journal corruption: {reason}");
                if db.dead_letter(&hash, &message).await? {
                    tracing::error!(track = %hash.short(), %reason, "corrupt journal entry; task dead-lettered");
                }
                journal.abort(&hash, &message).await?;
                report.corrupt.push((hash, reason));
            }
            JournalRecord::Valid(entry) if !entry.phase.is_in_flight() => {}
            JournalRecord::Valid(entry) => {
                let task = db.get_task(&entry.hash).await?;
                match task {
                    Some(task) if task.generation != entry.generation => {
                        tracing::info!(
                            track = %entry.hash.short(),
                            entry_generation = entry.generation,
                            task_generation = task.generation,
                            "dropping stale journal entry"
                        );
                        journal.invalidate(&entry.hash).await?;
                        report.stale.push(entry.hash);
                    }
                    None => {
                        journal.invalidate(&entry.hash).await?;
                        report.stale.push(entry.hash);
                    }
                    Some(task) if task.state == TaskState::Completed => {
                        journal.commit(&entry.hash).await?;
                        report.committed.push(entry.hash);
                    }
                    Some(task) if task.state == TaskState::PermanentlyFailed => {
                        let reason = task.last_error.as_deref().unwrap_or("dead-lettered");
                        journal.abort(&entry.hash, reason).await?;
                    }
                    Some(_) => {
                        tracing::info!(
                            track = %entry.hash.short(),
                            offset = entry.offset,
                            peer = %entry.snapshot.candidate.peer,
                            "interrupted transfer will resume"
                        );
                        report.resumable.push(entry.hash);
                    }
                }
            }
        }
    }

    report.reset = db.reset_active_to_pending().await?;
    Ok(report)
}
