use std::time::Duration;

/// Capped exponential backoff for sync restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before retry number `attempt` (zero based).
    ///
    /// A server-provided `retry_after` hint wins when it is longer than the
    /// computed backoff; the result never exceeds `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let multiplier = 1_u32 << attempt.min(20);
        let calculated = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        calculated
            .max(retry_after.unwrap_or_default())
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_base_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(0, None), Duration::from_millis(250));
    }

    #[test]
    fn doubles_per_attempt_until_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3, None), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(u32::MAX, None), Duration::from_secs(1));
    }

    #[test]
    fn longer_retry_after_hint_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for_attempt(1, Some(Duration::from_secs(10))),
            Duration::from_secs(10)
        );
        assert_eq!(
            policy.delay_for_attempt(1, Some(Duration::from_secs(90))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn max_is_never_below_base() {
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(5));
    }
}
