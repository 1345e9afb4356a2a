use std::time::Duration;

use crate::config::{secs, ReconnectConfig, RetryConfig};

use super::classify::ErrorKind;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the task is dead-lettered.
    NoRetry,
    /// Re-enter `Pending`, eligible again after the given delay.
    RetryAfter(Duration),
}

/// Soft-retry budget with exponential backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Soft retries allowed after the first attempt.
    pub max_soft_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_soft_retries: cfg.max_soft_retries,
            base_delay: secs(cfg.base_delay_secs),
            max_delay: secs(cfg.max_delay_secs),
        }
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    ///
    /// Stalls never consume budget. I/O failures, journal corruption and
    /// cancellation are never soft-retried.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        match kind {
            ErrorKind::Stall => RetryDecision::RetryAfter(Duration::ZERO),
            ErrorKind::Io | ErrorKind::Corruption | ErrorKind::Cancelled => RetryDecision::NoRetry,
            ErrorKind::Transient | ErrorKind::Integrity => {
                if attempt > self.max_soft_retries {
                    return RetryDecision::NoRetry;
                }
                RetryDecision::RetryAfter(exponential(self.base_delay, self.max_delay, attempt))
            }
        }
    }
}

/// Circuit-breaker backoff for reconnect attempts: base, 2×base, 4×base, …
/// capped at `max`. Reset once the transport is connected again.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn from_config(cfg: &ReconnectConfig) -> Self {
        Self::new(secs(cfg.base_delay_secs), secs(cfg.max_delay_secs))
    }

    /// Delay before the next reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        exponential(self.base, self.max, self.attempt)
    }

    /// Reconnect attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// `base * 2^(attempt-1)`, capped at `max`.
fn exponential(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(exp).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_sequence_doubles_then_caps() {
        let mut b = ReconnectBackoff::from_config(&ReconnectConfig::default());
        let seq: Vec<u64> = (0..8).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(seq, [2, 4, 8, 16, 32, 60, 60, 60]);
        assert_eq!(b.attempts(), 8);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn soft_retries_are_bounded() {
        let p = RetryPolicy {
            max_soft_retries: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        };
        assert_eq!(
            p.decide(1, ErrorKind::Transient),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
        assert_eq!(
            p.decide(2, ErrorKind::Integrity),
            RetryDecision::RetryAfter(Duration::from_secs(10))
        );
        assert_eq!(p.decide(3, ErrorKind::Transient), RetryDecision::NoRetry);
    }

    #[test]
    fn io_is_never_retried_and_stall_is_free() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Io), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::Corruption), RetryDecision::NoRetry);
        assert_eq!(
            p.decide(100, ErrorKind::Stall),
            RetryDecision::RetryAfter(Duration::ZERO)
        );
    }

    #[test]
    fn backoff_is_capped() {
        let p = RetryPolicy {
            max_soft_retries: 50,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        };
        assert_eq!(
            p.decide(40, ErrorKind::Transient),
            RetryDecision::RetryAfter(Duration::from_secs(300))
        );
    }
}
