//! Retry policy: attempt budget and wait between attempts.

use std::time::Duration;

use crate::config::{Backoff, RetryConfig};

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitStrategy {
    Fixed(Duration),
    /// delay = base_delay * multiplier^(attempt - 1)
    Exponential { base_delay: Duration, multiplier: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub wait: WaitStrategy,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts,
            wait: WaitStrategy::Fixed(wait),
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            wait: WaitStrategy::Exponential {
                base_delay,
                multiplier,
            },
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        match config.backoff {
            Backoff::Fixed => Self::fixed(config.max_attempts, config.wait()),
            Backoff::Exponential { multiplier } => {
                Self::exponential(config.max_attempts, config.wait(), multiplier)
            }
        }
    }

    /// Delay after the failed attempt `attempt` (1-indexed).
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - attempt 1: 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempt: u32) -> Duration {
        match self.wait {
            WaitStrategy::Fixed(delay) => delay,
            WaitStrategy::Exponential {
                base_delay,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = base_delay.as_secs_f64() * multiplier.powi(exponent);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
        }
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 2s fixed wait.
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_is_three_attempts_with_fixed_wait() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.wait, WaitStrategy::Fixed(Duration::from_secs(2)));
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(5, 32)]
    fn exponential_backoff_doubles(#[case] attempt: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(2), 2.0);
        assert_eq!(policy.next_delay(attempt), Duration::from_secs(expected_secs));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(7)]
    fn fixed_wait_ignores_the_attempt(#[case] attempt: u32) {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.next_delay(attempt), Duration::from_millis(250));
    }

    #[test]
    fn huge_exponents_saturate() {
        let policy = RetryPolicy::exponential(u32::MAX, Duration::from_secs(1), 10.0);
        assert_eq!(policy.next_delay(10_000), Duration::MAX);
    }

    #[test]
    fn config_maps_to_policy() {
        let config = RetryConfig {
            max_attempts: 4,
            wait_ms: 100,
            backoff: Backoff::Exponential { multiplier: 3.0 },
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.next_delay(3), Duration::from_millis(900));
    }
}
