//! Fixtures shared by unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::candidate::{Codec, SearchCandidate};
use crate::journal::{JournalEntry, TaskSnapshot};
use crate::machine::DEFAULT_PRIORITY;
use crate::peer_health::PeerId;
use crate::retry::{NetworkFault, TransferError};
use crate::transport::{ProgressSink, TransferRequest, Transport};
use crate::track::TrackRequest;

pub(crate) fn request(title: &str) -> TrackRequest {
    let mut req = TrackRequest::new("Underworld", title);
    req.canonical_duration_secs = Some(637);
    req
}

pub(crate) fn flac(peer: &str, size_bytes: u64) -> SearchCandidate {
    SearchCandidate {
        peer: PeerId::new(peer),
        filename: format!("{peer}/music/track.flac"),
        bitrate_kbps: 1411,
        size_bytes,
        duration_secs: Some(637),
        has_free_slot: true,
        queue_length: 0,
        bpm: None,
        key: None,
        codec: Codec::Lossless,
    }
}

pub(crate) fn snapshot(req: &TrackRequest, candidate: SearchCandidate, dir: &Path) -> TaskSnapshot {
    let final_path = crate::storage::final_path_for(dir, req, &candidate);
    TaskSnapshot {
        request: req.clone(),
        temp_path: crate::storage::temp_path(&final_path),
        final_path,
        candidate,
        priority: DEFAULT_PRIORITY,
        retry_count: 0,
    }
}

pub(crate) fn prepare_entry(req: &TrackRequest, generation: u32, offset: u64, dir: &Path) -> JournalEntry {
    JournalEntry::prepare(
        req.hash(),
        generation,
        offset,
        snapshot(req, flac("alice", 112_000_000), dir),
        crate::task_db::unix_millis(),
    )
}

/// Lossless candidate the forensic filter accepts at any size: no declared
/// bitrate or duration to check against.
pub(crate) fn small_flac(peer: &str, size_bytes: u64) -> SearchCandidate {
    SearchCandidate {
        bitrate_kbps: 0,
        duration_secs: None,
        ..flac(peer, size_bytes)
    }
}

/// Request with no canonical duration, for use with `small_flac`.
pub(crate) fn plain_request(title: &str) -> TrackRequest {
    TrackRequest::new("Underworld", title)
}

/// What the fake transport does when asked for a peer's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Write the whole declared size and succeed.
    Deliver,
    /// Write this many bytes in total and report success.
    Short(u64),
    Fail(NetworkFault),
    /// Write this many bytes, then fail.
    FailAfter(u64, NetworkFault),
    /// Write up to this many bytes, then wait for cancellation.
    Hang(u64),
    Panic,
}

/// In-process transport driven by a per-peer script.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    results: Mutex<Vec<SearchCandidate>>,
    results_by_query: Mutex<HashMap<String, Vec<SearchCandidate>>>,
    behaviors: Mutex<HashMap<PeerId, Behavior>>,
    transfers: Mutex<Vec<TransferRequest>>,
    offline: AtomicBool,
}

impl FakeTransport {
    pub(crate) fn new(results: Vec<SearchCandidate>) -> Self {
        Self {
            results: Mutex::new(results),
            ..Self::default()
        }
    }

    /// Results for one exact query, overriding the default list.
    pub(crate) fn results_for(&self, query: &str, results: Vec<SearchCandidate>) {
        self.results_by_query.lock().unwrap().insert(query.to_string(), results);
    }

    pub(crate) fn script(&self, peer: &str, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(PeerId::new(peer), behavior);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn transfers(&self) -> Vec<TransferRequest> {
        self.transfers.lock().unwrap().clone()
    }
}

async fn fill_to(dest: &Path, target: u64, progress: &ProgressSink) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .await?;
    let have = file.metadata().await?.len();
    if target > have {
        let chunk = vec![0x5au8; (target - have) as usize];
        file.write_all(&chunk).await?;
        file.flush().await?;
    }
    progress.set(target.max(have));
    Ok(())
}

#[async_trait]
impl Transport for FakeTransport {
    async fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), TransferError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TransferError::network(NetworkFault::Refused, "still offline"))
        } else {
            Ok(())
        }
    }

    async fn search(&self, query: &str) -> Result<BoxStream<'static, SearchCandidate>, TransferError> {
        let results = match self.results_by_query.lock().unwrap().get(query) {
            Some(results) => results.clone(),
            None => self.results.lock().unwrap().clone(),
        };
        Ok(futures::stream::iter(results).boxed())
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<u64, TransferError> {
        self.transfers.lock().unwrap().push(request.clone());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&request.peer)
            .copied()
            .unwrap_or(Behavior::Deliver);
        match behavior {
            Behavior::Deliver => {
                fill_to(&request.dest, request.size_bytes, &progress).await?;
                Ok(request.size_bytes)
            }
            Behavior::Short(len) => {
                fill_to(&request.dest, len, &progress).await?;
                Ok(len)
            }
            Behavior::Fail(fault) => Err(TransferError::network(fault, "scripted failure")),
            Behavior::FailAfter(len, fault) => {
                fill_to(&request.dest, len, &progress).await?;
                Err(TransferError::network(fault, "scripted failure"))
            }
            Behavior::Hang(len) => {
                fill_to(&request.dest, len, &progress).await?;
                cancel.cancelled().await;
                Err(TransferError::Cancelled)
            }
            Behavior::Panic => panic!("scripted transport panic"),
        }
    }
}
