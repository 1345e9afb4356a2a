//! Watches a running transfer: heartbeat checkpoints, progress events,
//! stall detection, and cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, MissedTickBehavior};

use super::{Superseded, Worker};
use crate::candidate::SearchCandidate;
use crate::journal::{CheckpointOutcome, StallCheck, StallDetector};
use crate::retry::AcquisitionError;
use crate::scheduler::{AcquisitionEvent, ProgressStats};
use crate::transport::{ProgressSink, TransferRequest};

/// `tokio::time::interval` rejects a zero period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

pub(super) struct TransferRun {
    pub(super) result: Result<u64, AcquisitionError>,
    /// Length of the partial file when the transfer stopped.
    pub(super) offset: u64,
}

impl Worker {
    /// Run one transfer to its end. Errors returned here are internal
    /// (database, superseded generation); transfer failures are carried in
    /// `TransferRun::result`.
    pub(super) async fn run_transfer(
        &mut self,
        candidate: &SearchCandidate,
        temp: &Path,
        resume_from: u64,
    ) -> Result<TransferRun> {
        let request = TransferRequest {
            peer: candidate.peer.clone(),
            filename: candidate.filename.clone(),
            size_bytes: candidate.size_bytes,
            dest: temp.to_path_buf(),
            resume_from,
        };
        let sink = ProgressSink::starting_at(resume_from);
        let token = self.cancel.token().child_token();
        let started = Instant::now();
        let mut stall = StallDetector::new(self.ctx.config.journal.stall_intervals, resume_from);

        let mut ticker = tokio::time::interval(self.ctx.config.heartbeat().max(MIN_HEARTBEAT));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let transport = Arc::clone(&self.ctx.transport);
        let transfer = transport.transfer(&request, sink.clone(), token.clone());
        tokio::pin!(transfer);

        loop {
            tokio::select! {
                biased;
                res = &mut transfer => {
                    let offset = sink.bytes();
                    let reason = self.cancel.reason();
                    return Ok(TransferRun {
                        result: res.map_err(|e| AcquisitionError::from_transfer(e, &candidate.peer, reason)),
                        offset,
                    });
                }
                _ = self.cancel.cancelled() => {
                    token.cancel();
                    return Ok(TransferRun {
                        result: Err(AcquisitionError::Cancelled(self.cancel.reason())),
                        offset: sink.bytes(),
                    });
                }
                _ = ticker.tick() => {
                    let offset = sink.bytes();
                    if let Err(err) = self.heartbeat(candidate.size_bytes, resume_from, offset, started).await {
                        token.cancel();
                        return Err(err);
                    }
                    if stall.observe(offset) == StallCheck::Stalled {
                        token.cancel();
                        return Ok(TransferRun {
                            result: Err(AcquisitionError::StallTimeout {
                                peer: candidate.peer.clone(),
                                intervals: stall.limit(),
                            }),
                            offset,
                        });
                    }
                }
            }
        }
    }

    /// Checkpoint first, then the task row, then the event.
    async fn heartbeat(&mut self, total: u64, resumed_from: u64, offset: u64, started: Instant) -> Result<()> {
        let offset = offset.min(total);
        self.checkpoint(offset).await?;
        self.ctx
            .db
            .record_progress(&self.task.hash, self.task.generation, offset)
            .await?;
        self.task.bytes_done = offset;
        self.ctx.events.emit(AcquisitionEvent::Progress {
            hash: self.task.hash.clone(),
            stats: ProgressStats {
                bytes_done: offset,
                total_bytes: total,
                resumed_from,
                elapsed_secs: started.elapsed().as_secs_f64(),
            },
        });
        Ok(())
    }

    /// Journal checkpoint at `offset`; `Superseded` if a newer generation
    /// owns the entry.
    pub(super) async fn checkpoint(&self, offset: u64) -> Result<()> {
        match self
            .ctx
            .journal
            .checkpoint(&self.task.hash, self.task.generation, offset)
            .await?
        {
            CheckpointOutcome::Written => Ok(()),
            CheckpointOutcome::Superseded => Err(Superseded.into()),
        }
    }
}
