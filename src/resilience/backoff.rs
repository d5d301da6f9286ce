//! Exponential backoff with jitter for background delivery retries.

use std::time::Duration;

use rand::Rng;

use crate::config::NotificationConfig;

/// Doubling delay between attempts, capped, plus up to 10% jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(attempt - 1);
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_range = capped.as_millis() as u64 / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        capped + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));

        let first = backoff.delay(1);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(110));

        let second = backoff.delay(2);
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(220));

        let capped = backoff.delay(30);
        assert!(capped >= Duration::from_millis(1000) && capped < Duration::from_millis(1100));
    }

    #[test]
    fn zero_attempt_means_no_wait() {
        let backoff = Backoff::from_config(&NotificationConfig::default());
        assert_eq!(backoff.delay(0), Duration::ZERO);
    }
}
