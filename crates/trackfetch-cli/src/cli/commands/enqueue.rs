//! `trackfetch enqueue <artist> <title>` – queue a track.

use anyhow::{bail, Result};
use trackfetch_core::machine::Priority;
use trackfetch_core::scheduler::QueueCommands;
use trackfetch_core::task_db::EnqueueOutcome;
use trackfetch_core::track::TrackRequest;

use crate::cli::TrackTargets;

pub async fn run_enqueue(
    commands: &QueueCommands,
    artist: String,
    title: String,
    priority: Priority,
    targets: &TrackTargets,
) -> Result<()> {
    if artist.trim().is_empty() || title.trim().is_empty() {
        bail!("artist and title must not be empty");
    }
    let request = request_with_targets(artist, title, targets);
    let hash = request.hash();
    match commands.enqueue(&request, priority).await? {
        EnqueueOutcome::Inserted => println!("Queued {} ({hash})", request.query()),
        EnqueueOutcome::PriorityRaised { state } => {
            println!("Already queued ({state}); priority raised to {priority}: {hash}")
        }
        EnqueueOutcome::Unchanged { state } => println!("Already {state}: {hash}"),
    }
    Ok(())
}

pub(crate) fn request_with_targets(artist: String, title: String, targets: &TrackTargets) -> TrackRequest {
    let mut request = TrackRequest::new(artist, title);
    request.canonical_duration_secs = targets.duration;
    request.target_bpm = targets.bpm;
    request.target_key = targets.key;
    request
}
