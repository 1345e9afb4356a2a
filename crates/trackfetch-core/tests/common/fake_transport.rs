//! Scripted in-process peer network for integration tests.
//!
//! Search returns a fixed candidate list (optionally per query). Each peer
//! follows a script: deliver the file, fail with a network fault, or write
//! a prefix and then stall until cancelled. Connectivity can be toggled to
//! exercise the scheduler's circuit breaker.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use trackfetch_core::candidate::SearchCandidate;
use trackfetch_core::peer_health::PeerId;
use trackfetch_core::retry::{NetworkFault, TransferError};
use trackfetch_core::transport::{ProgressSink, TransferRequest, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerScript {
    Deliver,
    Fail(NetworkFault),
    /// Write this many bytes in total, then hold the transfer open without
    /// further progress until cancelled.
    Stall(u64),
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    results: Mutex<Vec<SearchCandidate>>,
    by_query: Mutex<HashMap<String, Vec<SearchCandidate>>>,
    scripts: Mutex<HashMap<PeerId, PeerScript>>,
    transfers: Mutex<Vec<TransferRequest>>,
    offline: AtomicBool,
    reconnects: AtomicU32,
}

impl FakeTransport {
    pub fn new(results: Vec<SearchCandidate>) -> Self {
        Self {
            results: Mutex::new(results),
            ..Self::default()
        }
    }

    pub fn results_for(&self, query: &str, results: Vec<SearchCandidate>) {
        self.by_query.lock().unwrap().insert(query.to_string(), results);
    }

    pub fn script(&self, peer: &str, script: PeerScript) {
        self.scripts.lock().unwrap().insert(PeerId::new(peer), script);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn transfers_from(&self, peer: &str) -> Vec<TransferRequest> {
        self.transfers()
            .into_iter()
            .filter(|t| t.peer.as_str() == peer)
            .collect()
    }
}

/// Deterministic payload so resumed files can be checked byte for byte.
pub fn payload_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

async fn write_until(dest: &Path, target: u64, progress: &ProgressSink) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .await?;
    let mut have = file.metadata().await?.len();
    while have < target {
        let end = target.min(have + 64 * 1024);
        let chunk: Vec<u8> = (have..end).map(payload_byte).collect();
        file.write_all(&chunk).await?;
        have = end;
        progress.set(have);
    }
    file.flush().await?;
    progress.set(have);
    Ok(())
}

#[async_trait]
impl Transport for FakeTransport {
    async fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), TransferError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            Err(TransferError::network(NetworkFault::Refused, "network unreachable"))
        } else {
            Ok(())
        }
    }

    async fn search(&self, query: &str) -> Result<BoxStream<'static, SearchCandidate>, TransferError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransferError::network(NetworkFault::Disconnect, "not connected"));
        }
        let results = match self.by_query.lock().unwrap().get(query) {
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
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.peer)
            .copied()
            .unwrap_or(PeerScript::Deliver);
        match script {
            PeerScript::Deliver => {
                write_until(&request.dest, request.size_bytes, &progress).await?;
                Ok(request.size_bytes)
            }
            PeerScript::Fail(fault) => Err(TransferError::network(fault, "peer dropped the transfer")),
            PeerScript::Stall(len) => {
                write_until(&request.dest, len, &progress).await?;
                cancel.cancelled().await;
                Err(TransferError::Cancelled)
            }
        }
    }
}
