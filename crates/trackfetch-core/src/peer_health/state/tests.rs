use std::sync::Arc;

use super::*;

fn peer(name: &str) -> PeerId {
    PeerId::new(name)
}

#[test]
fn blacklists_after_threshold_consecutive_failures() {
    let tracker = PeerHealthTracker::new(3);
    let p = peer("flaky");
    assert!(!tracker.record_failure(&p, FailureCause::Timeout));
    assert!(!tracker.record_failure(&p, FailureCause::Disconnect));
    assert!(tracker.record_failure(&p, FailureCause::Refused));

    let record = tracker.get(&p).unwrap();
    assert!(record.blacklisted);
    assert!(record.blacklisted_at.is_some());
    assert_eq!(record.consecutive_failures, 3);
    assert_eq!(record.last_failure, Some(FailureCause::Refused));
    assert!(tracker.is_blacklisted(&p));
}

#[test]
fn success_resets_streak_but_not_blacklist() {
    let tracker = PeerHealthTracker::new(3);
    let p = peer("a");
    tracker.record_failure(&p, FailureCause::Timeout);
    tracker.record_failure(&p, FailureCause::Timeout);
    tracker.record_success(&p);
    assert!(!tracker.record_failure(&p, FailureCause::Timeout));
    assert_eq!(tracker.get(&p).unwrap().consecutive_failures, 1);

    tracker.record_failure(&p, FailureCause::Timeout);
    tracker.record_failure(&p, FailureCause::Timeout);
    assert!(tracker.is_blacklisted(&p));
    tracker.record_success(&p);
    assert!(tracker.is_blacklisted(&p));
}

#[test]
fn signals_cover_known_peers_only() {
    let tracker = PeerHealthTracker::new(3);
    let a = peer("a");
    tracker.record_success(&a);
    tracker.record_failure(&a, FailureCause::Stall);

    let signals = tracker.signals(&[a.clone(), peer("unknown")]);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals.failure_rate(&a), 0.5);
    assert_eq!(signals.failure_rate(&peer("unknown")), 0.0);
    assert!(!signals.is_blacklisted(&a));
}

#[test]
fn clear_forgets_blacklisted_peer() {
    let tracker = PeerHealthTracker::new(1);
    let p = peer("bad");
    assert!(tracker.record_failure(&p, FailureCause::Refused));
    assert!(tracker.clear(&p));
    assert!(!tracker.is_blacklisted(&p));
    assert!(tracker.get(&p).is_none());
    assert!(!tracker.clear(&p));
}

#[test]
fn concurrent_failures_on_one_peer_are_all_counted() {
    let tracker = Arc::new(PeerHealthTracker::new(1000));
    let p = peer("shared");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            let p = p.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    tracker.record_failure(&p, FailureCause::Timeout);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let record = tracker.get(&p).unwrap();
    assert_eq!(record.failures, 400);
    assert_eq!(record.consecutive_failures, 400);
}

#[test]
fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("peer_health.json");

    let tracker = PeerHealthTracker::open(&path, 2).unwrap();
    let bad = peer("bad");
    tracker.record_failure(&bad, FailureCause::Disconnect);
    tracker.record_failure(&bad, FailureCause::Disconnect);
    tracker.record_success(&peer("good"));
    tracker.flush().unwrap();
    assert!(!tracker.is_dirty());

    // A higher threshold on reload does not lift an existing blacklist.
    let reloaded = PeerHealthTracker::load_from_path(&path, 5).unwrap().unwrap();
    assert!(reloaded.is_blacklisted(&bad));
    assert_eq!(reloaded.records().len(), 2);
    assert_eq!(reloaded.get(&peer("good")).unwrap().successes, 1);
}

#[test]
fn missing_snapshot_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = PeerHealthTracker::load_from_path(&dir.path().join("nope.json"), 3).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn flush_without_path_is_a_noop() {
    let tracker = PeerHealthTracker::new(3);
    tracker.record_success(&peer("a"));
    tracker.flush().unwrap();
}
