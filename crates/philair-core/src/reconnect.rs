// ── Reconnect backoff ──

use std::time::Duration;

/// Exponential backoff configuration for session recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay after the first failed attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Retries after the first failed attempt of one reconnect.
    /// `None` means retry until cancelled. Default: 3.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: Some(3),
        }
    }
}

impl ReconnectConfig {
    /// A single attempt, no retries.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    pub(crate) fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries.is_some_and(|max| attempt >= max)
    }

    /// Pause after failed attempt `attempt` (zero-based).
    ///
    /// The initial delay doubles per attempt and is spread by up to 25%
    /// either way, never exceeding `max_delay`. The spread is a fixed
    /// function of the attempt number, so runs are reproducible.
    pub(crate) fn delay_before_retry(&self, attempt: u32) -> Duration {
        let doubled = self.initial_delay.saturating_mul(1 << attempt.min(16));
        let capped = doubled.min(self.max_delay);

        let bucket = attempt.wrapping_mul(2_654_435_761) % 1000;
        let spread = 0.75 + 0.5 * f64::from(bucket) / 1000.0;

        Duration::try_from_secs_f64(capped.as_secs_f64() * spread)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_retries, Some(3));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let config = ReconnectConfig::default();

        let d0 = config.delay_before_retry(0);
        let d1 = config.delay_before_retry(1);
        let d2 = config.delay_before_retry(2);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn delay_never_exceeds_max() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        for attempt in [4, 10, 31, u32::MAX] {
            let delay = config.delay_before_retry(attempt);
            assert!(delay <= config.max_delay, "attempt {attempt}: {delay:?}");
            assert!(delay >= Duration::from_millis(7_500), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn delay_is_reproducible() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_before_retry(3), config.delay_before_retry(3));
        assert!(config.delay_before_retry(0) >= Duration::from_millis(750));
        assert!(config.delay_before_retry(0) <= Duration::from_millis(1_250));
    }

    #[test]
    fn retry_budget() {
        let config = ReconnectConfig::default();
        assert!(!config.exhausted(2));
        assert!(config.exhausted(3));
        assert!(ReconnectConfig::single_attempt().exhausted(0));

        let unbounded = ReconnectConfig {
            max_retries: None,
            ..ReconnectConfig::default()
        };
        assert!(!unbounded.exhausted(u32::MAX));
    }
}
