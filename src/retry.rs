//! Backoff delay calculation for the retry engine.
//!
//! The retry *loop* lives in the scheduler (it owns attempts, deadlines,
//! and cancellation); this module owns the delay law. Classification of
//! what is retryable at all lives on
//! [`KvasirError::is_retryable()`](crate::KvasirError::is_retryable).

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

impl BackoffConfig {
    /// Delay before the `retry`-th re-attempt (1-indexed: the first
    /// retry waits `base_delay`).
    ///
    /// `min(base_delay * multiplier^(retry-1), max_delay)`, without
    /// jitter — see [`next_delay()`](Self::next_delay) for the full
    /// calculation.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// The effective delay before the `retry`-th re-attempt: the backoff
    /// law, jittered by a uniform factor in [0.5, 1.5) when enabled,
    /// with any provider `Retry-After` hint applied as a floor.
    pub fn next_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.retry_delay(retry);
        if self.jitter {
            let factor: f64 = rand::rng().random_range(0.5..1.5);
            delay = Duration::from_secs_f64(delay.as_secs_f64() * factor);
        }
        match retry_after {
            Some(floor) => delay.max(floor),
            None => delay,
        }
    }

    /// Whether another attempt is allowed after `attempts` completed ones.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig::new()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(60))
            .multiplier(2.0)
            .max_attempts(5)
            .jitter(false)
    }

    #[test]
    fn delay_is_exact_without_jitter() {
        let config = config();
        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(400));
        assert_eq!(config.retry_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn delay_capped_at_max() {
        let config = config().max_delay(Duration::from_millis(300));
        assert_eq!(config.retry_delay(3), Duration::from_millis(300));
        assert_eq!(config.retry_delay(10), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_in_band() {
        let config = config().jitter(true);
        for _ in 0..200 {
            let d = config.next_delay(1, None);
            assert!(d >= Duration::from_millis(50), "delay {d:?} below band");
            assert!(d < Duration::from_millis(150), "delay {d:?} above band");
        }
    }

    #[test]
    fn retry_after_is_a_floor() {
        let config = config();
        // Calculated delay 100ms, provider asks for 2s.
        assert_eq!(
            config.next_delay(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        // Calculated delay 400ms already above a 50ms hint.
        assert_eq!(
            config.next_delay(3, Some(Duration::from_millis(50))),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn attempt_cap() {
        let config = config();
        assert!(config.allows_retry(4));
        assert!(!config.allows_retry(5));
        assert!(!BackoffConfig::disabled().allows_retry(1));
    }
}
