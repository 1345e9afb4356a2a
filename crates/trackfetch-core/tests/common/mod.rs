#![allow(dead_code)]

pub mod fake_transport;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use trackfetch_core::candidate::{Codec, SearchCandidate};
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::machine::{TaskState, WorkerContext};
use trackfetch_core::peer_health::{PeerHealthTracker, PeerId};
use trackfetch_core::scheduler::{AcquisitionEvent, Scheduler};
use trackfetch_core::task_db::TaskDb;
use trackfetch_core::track::TrackHash;

use fake_transport::FakeTransport;

/// Millisecond-scale timings so whole scenarios run in well under a second.
pub fn fast_config() -> TrackfetchConfig {
    let mut cfg = TrackfetchConfig::default();
    cfg.max_concurrent_transfers = 1;
    cfg.search_timeout_secs = 0.2;
    cfg.poll_interval_secs = 0.01;
    cfg.journal.heartbeat_secs = 0.005;
    cfg.journal.stall_intervals = 1000;
    cfg.retry.base_delay_secs = 0.01;
    cfg.retry.max_delay_secs = 0.05;
    cfg.reconnect.base_delay_secs = 0.002;
    cfg.reconnect.max_delay_secs = 0.06;
    cfg.peer_health.flush_interval_secs = 0.05;
    cfg
}

pub fn candidate(peer: &str, codec: Codec, bitrate_kbps: u32, size_bytes: u64, duration_secs: u32) -> SearchCandidate {
    let ext = match codec {
        Codec::Lossless => "flac",
        Codec::Lossy => "mp3",
    };
    SearchCandidate {
        peer: PeerId::new(peer),
        filename: format!("{peer}/shared/track.{ext}"),
        bitrate_kbps,
        size_bytes,
        duration_secs: Some(duration_secs),
        has_free_slot: true,
        queue_length: 0,
        bpm: None,
        key: None,
        codec,
    }
}

pub struct Engine {
    pub scheduler: Scheduler,
    pub transport: Arc<FakeTransport>,
    pub peers: Arc<PeerHealthTracker>,
    pub db: TaskDb,
    handle: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
}

impl Engine {
    pub fn new(cfg: TrackfetchConfig, db: TaskDb, transport: Arc<FakeTransport>, download_dir: &Path) -> Self {
        let peers = Arc::new(PeerHealthTracker::new(cfg.peer_health.blacklist_threshold));
        let ctx = WorkerContext::new(
            cfg,
            db.clone(),
            transport.clone(),
            peers.clone(),
            download_dir.to_path_buf(),
        );
        Self {
            scheduler: Scheduler::new(Arc::new(ctx)),
            transport,
            peers,
            db,
            handle: None,
        }
    }

    pub fn start(&mut self) {
        let scheduler = self.scheduler.clone();
        self.handle = Some(tokio::spawn(async move { scheduler.run().await }));
    }

    pub fn events(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.scheduler.subscribe()
    }

    /// Graceful stop: workers park their tasks and the run loop returns.
    pub async fn stop(mut self) {
        self.scheduler.shutdown();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("scheduler stops")
                .unwrap()
                .unwrap();
        }
    }

    /// Simulated process death: the run loop and its workers are dropped
    /// mid-flight with no chance to settle anything.
    pub async fn crash(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub async fn wait_for_state(&self, hash: &TrackHash, state: TaskState) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(task) = self.db.get_task(hash).await.unwrap() {
                    if task.state == state {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "task never reached {state}");
    }
}

pub async fn next_event<F>(rx: &mut broadcast::Receiver<AcquisitionEvent>, mut matches: F) -> AcquisitionEvent
where
    F: FnMut(&AcquisitionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(event) = rx.recv().await {
                if matches(&event) {
                    return event;
                }
            }
        }
    })
    .await
    .expect("event")
}
