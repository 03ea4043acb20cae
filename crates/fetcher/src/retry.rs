use std::time::Duration;

/// Capped exponential backoff between request attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max,
            max_retries,
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once retries are spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(10), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 6);

        assert_eq!(backoff.delay(1), Some(Duration::from_millis(100)));
        assert_eq!(backoff.delay(2), Some(Duration::from_millis(200)));
        assert_eq!(backoff.delay(3), Some(Duration::from_millis(400)));
        assert_eq!(backoff.delay(4), Some(Duration::from_millis(500)));
        assert_eq!(backoff.delay(6), Some(Duration::from_millis(500)));
        assert_eq!(backoff.delay(7), None);
    }

    #[test]
    fn test_zero_retries_never_waits() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 0);
        assert_eq!(backoff.delay(1), None);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 100);
        assert_eq!(backoff.delay(64), Some(Duration::from_secs(30)));
    }
}
