//! `trackfetch rank <candidates.json>` – offline forensic/ranking replay.
//!
//! Uses the configured weights and the persisted peer table, so the order
//! printed is the order a worker would try.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use trackfetch_core::candidate::SearchCandidate;
use trackfetch_core::config::TrackfetchConfig;
use trackfetch_core::peer_health::{PeerHealthStore, PeerHealthTracker, PeerId};
use trackfetch_core::ranking::{ExclusionReason, RankingEngine};

use super::enqueue::request_with_targets;
use crate::cli::TrackTargets;

pub fn run_rank(cfg: &TrackfetchConfig, path: &Path, targets: &TrackTargets, json: bool) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("read candidates: {}", path.display()))?;
    let candidates: Vec<SearchCandidate> =
        serde_json::from_slice(&bytes).with_context(|| format!("parse candidates: {}", path.display()))?;

    let tracker = PeerHealthTracker::open(
        PeerHealthTracker::default_path()?,
        cfg.peer_health.blacklist_threshold,
    )?;
    let peers: Vec<PeerId> = candidates.iter().map(|c| c.peer.clone()).collect();
    let signals = tracker.signals(&peers);

    // Artist/title do not affect ranking; only the targets do.
    let request = request_with_targets(String::new(), String::new(), targets);
    let engine = RankingEngine::new(cfg.ranking.clone());
    let outcome = engine.rank(&request, candidates, &signals, &HashSet::new());

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    for (i, r) in outcome.ranked.iter().enumerate() {
        println!(
            "{:>2}. {:<8} {:>8.1}  {}:{}\n      {}",
            i + 1,
            format!("{:?}", r.tier),
            r.score,
            r.candidate.peer,
            r.candidate.filename,
            r.breakdown,
        );
    }
    for excluded in &outcome.excluded {
        let why = match &excluded.reason {
            ExclusionReason::Forensic(hits) => hits
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
            ExclusionReason::BlacklistedPeer => "blacklisted peer".to_string(),
            ExclusionReason::PreviouslyRejected => "previously rejected".to_string(),
            ExclusionReason::Duplicate => "duplicate".to_string(),
        };
        println!("  x  {}  ({why})", excluded.candidate);
    }
    if outcome.ranked.is_empty() {
        println!("No acceptable candidates.");
    }
    Ok(())
}
