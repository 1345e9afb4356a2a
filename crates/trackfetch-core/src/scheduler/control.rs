//! Per-task cancellation: a registry of running workers and the reason each
//! was asked to stop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::machine::Priority;
use crate::retry::CancelReason;
use crate::track::TrackHash;

/// A worker's view of its cancellation token. When the token fires without
/// an explicit reason (the scheduler's shutdown token is its parent), the
/// reason is `Shutdown`.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl CancelSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Record `reason` and fire the token. The first reason wins.
    pub fn cancel(&self, reason: CancelReason) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            slot.get_or_insert(reason);
        }
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn reason(&self) -> CancelReason {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or(CancelReason::Shutdown)
    }

    fn has_reason(&self) -> bool {
        self.reason.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

#[derive(Debug)]
struct RunningTask {
    signal: CancelSignal,
    priority: Priority,
}

/// Registry of tasks that currently own a worker slot.
#[derive(Debug, Default)]
pub struct TaskControl {
    running: Mutex<HashMap<TrackHash, RunningTask>>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker for `hash`; its token is a child of `parent`.
    pub fn register(&self, hash: &TrackHash, priority: Priority, parent: &CancellationToken) -> CancelSignal {
        let signal = CancelSignal::new(parent.child_token());
        self.running.lock().unwrap_or_else(PoisonError::into_inner).insert(
            hash.clone(),
            RunningTask {
                signal: signal.clone(),
                priority,
            },
        );
        signal
    }

    pub fn unregister(&self, hash: &TrackHash) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(hash);
    }

    /// Ask a running worker to stop. Returns `false` if none is running.
    pub fn signal(&self, hash: &TrackHash, reason: CancelReason) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.get(hash) {
            Some(task) => {
                task.signal.cancel(reason);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, hash: &TrackHash) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(hash)
    }

    pub fn running(&self) -> HashSet<TrackHash> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Running workers that were asked to stop and have not exited yet.
    pub fn stopping(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| task.signal.has_reason())
            .count()
    }

    /// Least urgent running task not already asked to stop; ties go to the
    /// larger hash so the choice is deterministic.
    pub fn least_urgent(&self) -> Option<(TrackHash, Priority)> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, task)| !task.signal.has_reason())
            .max_by(|(ha, a), (hb, b)| a.priority.cmp(&b.priority).then_with(|| ha.cmp(hb)))
            .map(|(hash, task)| (hash.clone(), task.priority))
    }
}

/// Frees a worker's registry slot when dropped, so a worker that is aborted
/// or never polled still gives its slot back.
#[derive(Debug)]
pub(crate) struct SlotGuard {
    control: Arc<TaskControl>,
    hash: TrackHash,
}

impl SlotGuard {
    pub(crate) fn new(control: Arc<TaskControl>, hash: TrackHash) -> Self {
        Self { control, hash }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.control.unregister(&self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;

    #[test]
    fn signal_records_first_reason() {
        let control = TaskControl::new();
        let parent = CancellationToken::new();
        let hash = request("a").hash();
        let signal = control.register(&hash, 10, &parent);
        assert!(control.signal(&hash, CancelReason::Pause));
        assert!(control.signal(&hash, CancelReason::Cancel));
        assert!(signal.is_cancelled());
        assert_eq!(signal.reason(), CancelReason::Pause);
    }

    #[test]
    fn parent_cancel_means_shutdown() {
        let control = TaskControl::new();
        let parent = CancellationToken::new();
        let signal = control.register(&request("a").hash(), 10, &parent);
        parent.cancel();
        assert!(signal.is_cancelled());
        assert_eq!(signal.reason(), CancelReason::Shutdown);
    }

    #[test]
    fn least_urgent_skips_already_signalled() {
        let control = TaskControl::new();
        let parent = CancellationToken::new();
        let (a, b, c) = (request("a").hash(), request("b").hash(), request("c").hash());
        control.register(&a, 10, &parent);
        control.register(&b, 300, &parent);
        control.register(&c, 200, &parent);
        assert_eq!(control.least_urgent(), Some((b.clone(), 300)));
        control.signal(&b, CancelReason::Preempt);
        assert_eq!(control.least_urgent(), Some((c, 200)));
        assert_eq!(control.stopping(), 1);
        control.unregister(&b);
        assert_eq!(control.stopping(), 0);
        assert_eq!(control.len(), 2);
        assert!(!control.signal(&b, CancelReason::Pause));
    }

    #[tokio::test]
    async fn aborted_worker_frees_its_slot() {
        let control = Arc::new(TaskControl::new());
        let parent = CancellationToken::new();
        let hash = request("a").hash();
        control.register(&hash, 10, &parent);
        let slot = SlotGuard::new(Arc::clone(&control), hash.clone());
        let worker = tokio::spawn(async move {
            let _slot = slot;
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        assert!(control.is_running(&hash));

        worker.abort();
        let joined = worker.await;
        assert!(joined.is_err_and(|e| e.is_cancelled()));
        assert!(!control.is_running(&hash));
        assert!(control.is_empty());
    }
}
