//! Progress reporting for transfers (bytes done, ETA, rate).

use serde::Serialize;

/// Snapshot of one transfer's progress, carried in progress events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    /// Bytes in the partial file, including a resumed prefix.
    pub bytes_done: u64,
    /// Declared size of the candidate being transferred.
    pub total_bytes: u64,
    /// Offset this transfer resumed from (0 for a fresh transfer).
    pub resumed_from: u64,
    /// Elapsed time since this transfer started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Rate of this session in bytes per second (0 if elapsed is 0). The
    /// resumed prefix does not count.
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done.saturating_sub(self.resumed_from) as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if no bytes have moved yet).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_ignores_resumed_prefix() {
        let p = ProgressStats {
            bytes_done: 600,
            total_bytes: 1000,
            resumed_from: 400,
            elapsed_secs: 2.0,
        };
        assert_eq!(p.bytes_per_sec(), 100.0);
        assert_eq!(p.eta_secs(), Some(4.0));
        assert_eq!(p.fraction(), 0.6);
    }

    #[test]
    fn no_rate_no_eta() {
        let p = ProgressStats {
            bytes_done: 0,
            total_bytes: 10,
            resumed_from: 0,
            elapsed_secs: 0.0,
        };
        assert_eq!(p.eta_secs(), None);
    }
}
