//! Recovery journal: a write-ahead checkpoint log for in-flight transfers.
//!
//! A worker writes `prepare` before it starts transferring, a `checkpoint`
//! every heartbeat (before updating the task's visible progress), and
//! finally `commit` (entry removed) or `abort` (entry kept with a reason).
//! At startup `recover` turns every surviving `prepare`/`checkpoint` entry
//! back into resumable work.

mod recover;
mod stall;
mod store;
mod types;

pub use recover::{recover, RecoveryReport};
pub use stall::{StallCheck, StallDetector};
pub use store::JournalStore;
pub use types::{CheckpointOutcome, JournalEntry, JournalPhase, JournalRecord, TaskSnapshot};
