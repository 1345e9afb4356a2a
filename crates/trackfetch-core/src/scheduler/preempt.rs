//! Slot preemption: a more urgent task waiting on a full pool displaces the
//! least urgent running worker, which parks its task as `Deferred`.

use crate::machine::Priority;
use crate::retry::CancelReason;
use crate::track::TrackHash;

use super::control::TaskControl;

/// Pick the worker to displace for a waiting task of `waiting` priority.
///
/// Only one preemption is in flight at a time: while any worker is still
/// stopping, its slot is already on the way back.
pub(super) fn victim(control: &TaskControl, waiting: Priority) -> Option<TrackHash> {
    if control.stopping() > 0 {
        return None;
    }
    let (hash, running) = control.least_urgent()?;
    // Lower number is more urgent; equal priority never preempts.
    (waiting < running).then_some(hash)
}

/// Signal the victim, if any. Returns whether a worker was asked to yield.
pub(super) fn preempt_for(control: &TaskControl, waiting_hash: &TrackHash, waiting: Priority) -> bool {
    let Some(hash) = victim(control, waiting) else {
        return false;
    };
    if !control.signal(&hash, CancelReason::Preempt) {
        return false;
    }
    tracing::info!(
        track = %hash.short(),
        for_track = %waiting_hash.short(),
        priority = waiting,
        "preempting worker"
    );
    true
}
