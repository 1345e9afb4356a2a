//! Error taxonomy and retry policy.
//!
//! Transports report `TransferError`; workers lift that into an
//! `AcquisitionError`, classify it, and let the policy pick the next state.
//! Expected failures are values, not panics: every per-task error ends as a
//! state transition at the worker boundary.

mod classify;
mod error;
mod policy;

pub use classify::{classify, peer_fault, ErrorKind};
pub use error::{AcquisitionError, CancelReason, NetworkFault, TransferError};
pub use policy::{ReconnectBackoff, RetryDecision, RetryPolicy};
