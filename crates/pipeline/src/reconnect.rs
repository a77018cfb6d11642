//! Adapter reconnect policies
//!
//! Each provider family owns its own policy: the fixed-delay family
//! retries indefinitely, the exponential family stops after a bounded
//! number of attempts and surfaces a terminal failure. Delays are
//! monotonically non-decreasing in both.

use std::time::Duration;

/// Reconnect policy variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Retry forever with the same delay between attempts.
    FixedDelay { delay: Duration },
    /// Double the delay each attempt; give up after `max_attempts`.
    ExponentialBackoff {
        base: Duration,
        max_attempts: u32,
    },
}

/// Tracks attempts against a policy.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectSchedule {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, or `None` once the policy is
    /// exhausted (terminal failure).
    pub fn next_delay(&mut self) -> Option<Duration> {
        match self.policy {
            ReconnectPolicy::FixedDelay { delay } => {
                self.attempt += 1;
                Some(delay)
            }
            ReconnectPolicy::ExponentialBackoff { base, max_attempts } => {
                if self.attempt >= max_attempts {
                    return None;
                }
                let delay = base.saturating_mul(1u32 << self.attempt.min(16));
                self.attempt += 1;
                Some(delay)
            }
        }
    }

    /// Call after a successful connect so the next outage starts fresh.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_never_exhausts() {
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::FixedDelay {
            delay: Duration::from_secs(3),
        });
        for _ in 0..100 {
            assert_eq!(schedule.next_delay(), Some(Duration::from_secs(3)));
        }
    }

    #[test]
    fn test_exponential_backoff_bound() {
        // Three attempts at base 1000ms, then terminal.
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::ExponentialBackoff {
            base: Duration::from_millis(1000),
            max_attempts: 3,
        });

        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(4000)));
        assert_eq!(schedule.next_delay(), None);
        // Stays exhausted.
        assert_eq!(schedule.next_delay(), None);
        assert_eq!(schedule.attempts(), 3);
    }

    #[test]
    fn test_delays_monotonically_non_decreasing() {
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::ExponentialBackoff {
            base: Duration::from_millis(500),
            max_attempts: 8,
        });
        let mut last = Duration::ZERO;
        while let Some(delay) = schedule.next_delay() {
            assert!(delay >= last);
            last = delay;
        }
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::ExponentialBackoff {
            base: Duration::from_millis(1000),
            max_attempts: 1,
        });
        assert!(schedule.next_delay().is_some());
        assert!(schedule.next_delay().is_none());

        schedule.reset();
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(1000)));
    }
}
