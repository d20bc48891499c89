//! Retry delay policy
//!
//! Pure function of the attempt number and the configured ladder, so the
//! policy is testable without a worker loop: exponential growth from a base
//! delay, clamped to a maximum, plus uniform jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay to wait before re-running attempt `attempt + 1`
///
/// `attempt` is 1-based: the delay after the first failed attempt is the
/// base delay (plus jitter). Jitter is additive, up to `jitter * delay`.
pub fn delay_for_attempt(attempt: u32, config: &RetryConfig) -> Duration {
    let attempt = attempt.max(1);
    let exponent = (attempt - 1).min(31);
    let raw = config.base_delay_ms as f64 * config.multiplier.max(1.0).powi(exponent as i32);
    let capped = raw.min(config.max_delay_ms as f64);

    let jitter_range = capped * config.jitter.clamp(0.0, 1.0);
    let jitter = if jitter_range > 0.0 {
        rand::thread_rng().gen_range(0.0..jitter_range)
    } else {
        0.0
    };

    Duration::from_millis((capped + jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 1000,
            jitter: 0.0,
        }
    }

    #[test]
    fn delays_double_without_jitter() {
        let config = config();
        assert_eq!(delay_for_attempt(1, &config), Duration::from_millis(100));
        assert_eq!(delay_for_attempt(2, &config), Duration::from_millis(200));
        assert_eq!(delay_for_attempt(3, &config), Duration::from_millis(400));
        assert_eq!(delay_for_attempt(4, &config), Duration::from_millis(800));
    }

    #[test]
    fn delay_clamps_at_max() {
        let config = config();
        assert_eq!(delay_for_attempt(5, &config), Duration::from_millis(1000));
        assert_eq!(delay_for_attempt(30, &config), Duration::from_millis(1000));
    }

    #[test]
    fn attempt_zero_is_treated_as_one() {
        let config = config();
        assert_eq!(delay_for_attempt(0, &config), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_the_configured_fraction() {
        let config = RetryConfig {
            jitter: 0.5,
            ..config()
        };
        for _ in 0..100 {
            let delay = delay_for_attempt(2, &config);
            assert!(delay >= Duration::from_millis(200), "delay {:?}", delay);
            assert!(delay <= Duration::from_millis(300), "delay {:?}", delay);
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let config = RetryConfig {
            jitter: 0.25,
            ..config()
        };
        let delay = delay_for_attempt(u32::MAX, &config);
        assert!(delay <= Duration::from_millis(1250));
    }
}
