//! SQLite persistence for download tasks and the recovery journal.
//!
//! Both tables live in one database file so a `HardRetry` can bump a task's
//! generation and purge its journal entry in a single transaction.

mod db;
mod journal_impl;
mod tasks;

pub use db::{unix_millis, TaskDb};
pub use tasks::EnqueueOutcome;

#[cfg(test)]
pub(crate) use db::open_memory;
