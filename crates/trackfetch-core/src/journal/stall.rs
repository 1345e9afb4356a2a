//! No-progress detection for running transfers.

/// Result of feeding one heartbeat's offset to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallCheck {
    Advanced,
    /// No progress for this many consecutive heartbeats.
    Idle(u32),
    Stalled,
}

/// Counts consecutive heartbeats whose checkpoint offset did not advance.
/// Reaching `limit` means the peer accepted the transfer but stopped
/// delivering bytes.
#[derive(Debug, Clone)]
pub struct StallDetector {
    limit: u32,
    last_offset: u64,
    idle: u32,
}

impl StallDetector {
    /// `start` is the offset the transfer began at.
    pub fn new(limit: u32, start: u64) -> Self {
        Self {
            limit: limit.max(1),
            last_offset: start,
            idle: 0,
        }
    }

    pub fn observe(&mut self, offset: u64) -> StallCheck {
        if offset > self.last_offset {
            self.last_offset = offset;
            self.idle = 0;
            return StallCheck::Advanced;
        }
        self.idle = self.idle.saturating_add(1);
        if self.idle >= self.limit {
            StallCheck::Stalled
        } else {
            StallCheck::Idle(self.idle)
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalls_after_exactly_limit_idle_heartbeats() {
        let mut d = StallDetector::new(4, 1000);
        assert_eq!(d.observe(1000), StallCheck::Idle(1));
        assert_eq!(d.observe(1000), StallCheck::Idle(2));
        assert_eq!(d.observe(1000), StallCheck::Idle(3));
        assert_eq!(d.observe(1000), StallCheck::Stalled);
    }

    #[test]
    fn progress_resets_the_count() {
        let mut d = StallDetector::new(4, 0);
        d.observe(0);
        d.observe(0);
        d.observe(0);
        assert_eq!(d.observe(10), StallCheck::Advanced);
        assert_eq!(d.observe(10), StallCheck::Idle(1));
    }

    #[test]
    fn going_backwards_is_not_progress() {
        let mut d = StallDetector::new(2, 500);
        assert_eq!(d.observe(100), StallCheck::Idle(1));
        assert_eq!(d.observe(499), StallCheck::Stalled);
    }
}
