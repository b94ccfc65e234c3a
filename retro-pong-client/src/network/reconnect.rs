//! Reconnection backoff
//!
//! Linear backoff: the n-th attempt waits `base * n`. After `max_attempts`
//! consecutive failures the policy is exhausted and yields no more delays.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.base_delay * self.attempts)
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_linearly() {
        let mut policy = ReconnectPolicy::new(5, Duration::from_secs(2));
        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6),
                Duration::from_secs(8),
                Duration::from_secs(10),
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_terminal_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(3, Duration::from_millis(10));
        for _ in 0..3 {
            assert!(policy.next_delay().is_some());
        }

        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(2, Duration::from_millis(100));
        policy.next_delay();
        policy.next_delay();
        policy.reset();

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.next_delay(), None);
    }
}
