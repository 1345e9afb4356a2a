//! Candidate selection and the journal-first transfer sequence.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{DownloadTask, Step, TaskOutcome, TaskState, Worker};
use crate::candidate::SearchCandidate;
use crate::journal::{JournalEntry, JournalRecord, TaskSnapshot};
use crate::retry::AcquisitionError;
use crate::storage;
use crate::task_db::unix_millis;

/// How a dispatched task starts.
pub(super) enum Resume {
    Fresh,
    /// Continue the journaled transfer without searching again.
    From {
        candidate: SearchCandidate,
        final_path: PathBuf,
        offset: u64,
    },
    /// The journal entry for this task cannot be trusted.
    Corrupt(String),
}

impl Worker {
    /// Decide from the journal whether the last transfer can be continued.
    pub(super) async fn resume_plan(&mut self) -> Result<Resume> {
        let hash = self.task.hash.clone();
        let entry = match self.ctx.journal.get(&hash).await? {
            None => return Ok(Resume::Fresh),
            Some(JournalRecord::Corrupt { reason, .. }) => return Ok(Resume::Corrupt(reason)),
            Some(JournalRecord::Valid(entry)) => entry,
        };
        if !entry.phase.is_in_flight() {
            return Ok(Resume::Fresh);
        }
        if entry.generation != self.task.generation {
            self.ctx.journal.invalidate(&hash).await?;
            return Ok(Resume::Fresh);
        }

        let candidate = entry.snapshot.candidate;
        let temp = entry.snapshot.temp_path;
        if self.ctx.peers.is_blacklisted(&candidate.peer) || self.task.rejected.contains(&candidate.id()) {
            tracing::info!(
                track = %hash.short(),
                peer = %candidate.peer,
                "journaled candidate no longer acceptable; searching again"
            );
            self.ctx.journal.invalidate(&hash).await?;
            discard_quietly(&temp).await;
            return Ok(Resume::Fresh);
        }

        let on_disk = storage::partial_len(&temp).await?;
        let usable = match on_disk {
            Some(len) if len >= entry.offset => {
                if len > entry.offset {
                    storage::truncate_partial(&temp, entry.offset).await?;
                }
                true
            }
            None => entry.offset == 0,
            Some(_) => false,
        };
        if !usable {
            tracing::warn!(
                track = %hash.short(),
                checkpoint = entry.offset,
                on_disk = ?on_disk,
                "partial file shorter than checkpoint; starting over"
            );
            self.ctx.journal.invalidate(&hash).await?;
            discard_quietly(&temp).await;
            return Ok(Resume::Fresh);
        }

        tracing::info!(
            track = %hash.short(),
            peer = %candidate.peer,
            offset = entry.offset,
            "resuming from journal"
        );
        Ok(Resume::From {
            candidate,
            final_path: entry.snapshot.final_path,
            offset: entry.offset,
        })
    }

    /// Transfer `candidate` into the temp path next to `final_path`,
    /// starting at `resume_from`.
    ///
    /// The journal `prepare` is written before the task enters
    /// `Transferring`, so a crash at any later point finds an entry to
    /// resume from.
    pub(super) async fn attempt(
        &mut self,
        candidate: &SearchCandidate,
        final_path: PathBuf,
        resume_from: u64,
    ) -> Result<Step> {
        let temp = storage::temp_path(&final_path);
        if resume_from == 0 {
            if let Err(e) = storage::discard_partial(&temp).await {
                return self.on_error(AcquisitionError::Io(e), candidate, &temp, 0).await;
            }
        }

        self.ctx
            .db
            .record_selection(
                &self.task.hash,
                self.task.generation,
                &candidate.peer,
                &final_path,
                candidate.size_bytes,
                resume_from,
            )
            .await?;
        self.task.current_peer = Some(candidate.peer.clone());
        self.task.file_path = Some(final_path.clone());
        self.task.bytes_total = Some(candidate.size_bytes);
        self.task.bytes_done = resume_from;
        self.transition(TaskState::CandidateSelected, None).await?;

        let entry = JournalEntry::prepare(
            self.task.hash.clone(),
            self.task.generation,
            resume_from,
            snapshot_of(&self.task, candidate, &temp, &final_path),
            unix_millis(),
        );
        self.ctx.journal.prepare(&entry).await?;
        self.transition(TaskState::Transferring, None).await?;
        tracing::info!(
            track = %self.task.hash.short(),
            peer = %candidate.peer,
            file = %candidate.filename,
            resume_from,
            "transfer started"
        );

        let run = self.run_transfer(candidate, &temp, resume_from).await?;
        match run.result {
            Ok(_) => self.finish_success(candidate, &temp, &final_path).await,
            Err(err) => self.on_error(err, candidate, &temp, run.offset).await,
        }
    }

    pub(super) async fn corrupt_journal(&mut self, reason: String) -> Result<TaskOutcome> {
        let err = AcquisitionError::JournalCorruption(reason);
        tracing::warn!(track = %self.task.hash.short(), error = %err, "journal entry rejected");
        let reason = err.to_string();
        self.ctx.journal.abort(&self.task.hash, &reason).await?;
        self.dead_letter(&reason).await
    }
}

fn snapshot_of(task: &DownloadTask, candidate: &SearchCandidate, temp: &Path, final_path: &Path) -> TaskSnapshot {
    TaskSnapshot {
        request: task.request.clone(),
        candidate: candidate.clone(),
        temp_path: temp.to_path_buf(),
        final_path: final_path.to_path_buf(),
        priority: task.priority,
        retry_count: task.retry_count,
    }
}

pub(super) async fn discard_quietly(temp: &Path) {
    if let Err(e) = storage::discard_partial(temp).await {
        tracing::warn!(path = %temp.display(), error = %e, "could not remove partial file");
    }
}
