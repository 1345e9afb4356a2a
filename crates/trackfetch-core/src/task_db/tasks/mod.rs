//! Task table operations: reads in `read`, writes and state transitions in
//! `write`.

mod read;
mod write;

pub use write::EnqueueOutcome;

pub(super) const TASK_COLUMNS: &str = "track_hash, generation, state, priority, request_json, \
     bytes_done, bytes_total, retry_count, retry_after, file_path, current_peer, \
     rejected_json, last_error, needs_review, review_reason, created_at, updated_at, \
     last_checkpoint_at";
