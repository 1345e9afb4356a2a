//! CLI command handlers, one file per command group.

mod dead_letters;
mod enqueue;
mod peers;
mod rank;
mod status;
mod task;

pub use dead_letters::run_dead_letters;
pub use enqueue::run_enqueue;
pub use peers::{run_clear_peer, run_peers};
pub use rank::run_rank;
pub use status::run_status;
pub use task::{run_task_command, TaskCommand};
