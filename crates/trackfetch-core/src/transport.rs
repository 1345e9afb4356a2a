//! Seams to the collaborators the engine does not own: the peer network
//! and the optional post-download audio check.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::candidate::SearchCandidate;
use crate::peer_health::PeerId;
use crate::retry::TransferError;
use crate::track::TrackRequest;

/// Shared byte counter a transport updates while writing. The value is the
/// absolute length of the partial file, including any resumed prefix.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink(Arc<AtomicU64>);

impl ProgressSink {
    pub fn starting_at(offset: u64) -> Self {
        Self(Arc::new(AtomicU64::new(offset)))
    }

    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::Release);
    }

    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn bytes(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// One transfer to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub peer: PeerId,
    /// Peer-side path of the file.
    pub filename: String,
    pub size_bytes: u64,
    /// Temp path to write to. Never the final path.
    pub dest: PathBuf,
    /// Bytes already present in `dest`; the transport appends from here.
    pub resume_from: u64,
}

/// Connected peer-search/transfer network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// One reconnect attempt. The scheduler paces calls with backoff.
    async fn reconnect(&self) -> Result<(), TransferError>;

    /// Start a search. The stream yields candidates as peers respond; the
    /// caller stops reading after its search timeout.
    async fn search(&self, query: &str) -> Result<BoxStream<'static, SearchCandidate>, TransferError>;

    /// Download `request.filename` from `request.peer` into `request.dest`,
    /// reporting the file length through `progress`. Must return
    /// `TransferError::Cancelled` promptly once `cancel` fires. Returns the
    /// final length of `dest`.
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<u64, TransferError>;
}

/// Result of the post-download check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub passed: bool,
    pub reason: Option<String>,
}

impl VerificationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Optional spectral/metadata check run after a track completes. A failed
/// check flags the track for review; it never undoes completion.
#[async_trait]
pub trait VerificationHook: Send + Sync {
    async fn verify(&self, path: &Path, request: &TrackRequest) -> VerificationResult;
}
