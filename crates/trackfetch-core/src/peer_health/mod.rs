//! Per-peer reliability tracking.
//!
//! Workers report every peer-attributable outcome here. After
//! `blacklist_threshold` consecutive failures a peer is blacklisted and
//! excluded from ranking until an operator clears it; there is no automatic
//! expiry. A success resets the consecutive count but does not lift a
//! blacklist.
//!
//! Only peer faults are recorded: integrity rejections and local I/O errors
//! never touch a peer's record.

mod entry;
mod key;
mod persist;
mod state;
mod store;

pub use entry::{FailureCause, PeerHealthRecord, PeerSignal, PeerSignals};
pub use key::PeerId;
pub use state::PeerHealthTracker;
pub use store::PeerHealthStore;
