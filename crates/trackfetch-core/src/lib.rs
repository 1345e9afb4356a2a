//! Acquisition engine: find the best copy of a track among peers, transfer
//! it, and survive crashes, stalls, and disconnects along the way.

pub mod config;
pub mod logging;

pub mod candidate;
pub mod forensic;
pub mod journal;
pub mod machine;
pub mod peer_health;
pub mod ranking;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod task_db;
pub mod track;
pub mod transport;

#[cfg(test)]
mod test_support;
