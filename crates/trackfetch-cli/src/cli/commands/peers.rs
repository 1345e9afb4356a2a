//! `trackfetch peers` / `trackfetch clear-peer <peer>` – peer health table.

use anyhow::Result;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::peer_health::{PeerHealthStore, PeerHealthTracker, PeerId};

fn open(cfg: &TrackfetchConfig) -> Result<PeerHealthTracker> {
    PeerHealthTracker::open(PeerHealthTracker::default_path()?, cfg.peer_health.blacklist_threshold)
}

pub fn run_peers(cfg: &TrackfetchConfig, blacklisted_only: bool) -> Result<()> {
    let tracker = open(cfg)?;
    let records: Vec<_> = tracker
        .records()
        .into_iter()
        .filter(|r| !blacklisted_only || r.blacklisted)
        .collect();
    if records.is_empty() {
        println!("No peers recorded.");
        return Ok(());
    }
    println!(
        "{:<24} {:>6} {:>6} {:>6} {:>7}  {}",
        "PEER", "OK", "FAIL", "STREAK", "RATE", "STATUS"
    );
    for r in records {
        let rate = format!("{:.0}%", r.failure_rate() * 100.0);
        println!(
            "{:<24} {:>6} {:>6} {:>6} {:>7}  {}",
            r.peer.as_str(),
            r.successes,
            r.failures,
            r.consecutive_failures,
            rate,
            if r.blacklisted { "blacklisted" } else { "ok" },
        );
    }
    Ok(())
}

pub fn run_clear_peer(cfg: &TrackfetchConfig, peer: &str) -> Result<()> {
    let tracker = open(cfg)?;
    if tracker.clear(&PeerId::new(peer)) {
        tracker.flush()?;
        println!("Cleared peer {peer}");
    } else {
        println!("No record for peer {peer}");
    }
    Ok(())
}
