use std::time::Duration;

use rand::Rng;

/// Rate limit between reconnect attempts: a fixed delay plus a small random
/// jitter so a fleet of clients does not redial in lockstep. Attempts are
/// unbounded; the policy only spaces them out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Self { delay, jitter }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(seminar_shared::constants::RECONNECT_DELAY_SECS),
            Duration::from_millis(seminar_shared::constants::RECONNECT_JITTER_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_millis(50));
        for _ in 0..32 {
            let d = policy.next_delay();
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_zero_jitter_is_fixed() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::ZERO);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }
}
