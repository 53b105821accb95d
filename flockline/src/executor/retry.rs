//! Retry configuration for command execution.
//!
//! Bounded settings use `nutype` validation so an out-of-range configuration
//! cannot be constructed.

use crate::errors::{CommandError, StoreError};
use nutype::nutype;
use std::time::Duration;

/// Maximum number of attempts for command execution.
///
/// Validated to be between 1 and 10 attempts.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxRetryAttempts(u32);

/// Base delay between retries in milliseconds.
///
/// Validated to be between 1ms and 10 seconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryBaseDelayMs(u64);

/// Configuration for command execution retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay between retry attempts.
    pub base_delay: Duration,
    /// Maximum delay between retry attempts (for exponential backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Builds a configuration from validated settings, keeping the default
    /// ceiling and multiplier.
    pub fn from_settings(attempts: MaxRetryAttempts, base_delay: RetryBaseDelayMs) -> Self {
        Self {
            max_attempts: attempts.into_inner(),
            base_delay: Duration::from_millis(base_delay.into_inner()),
            ..Self::default()
        }
    }

    /// Delay before retrying after the given zero-based attempt.
    ///
    /// Exponential backoff capped at `max_delay`, with ±25% jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_delay_ms = self.base_delay.as_millis() as f64;
        let max_delay_ms = self.max_delay.as_millis() as f64;

        let delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let delay = delay.min(max_delay_ms);

        let mut rng = rand::rng();
        let jitter = delay * 0.25 * rng.random_range(-1.0..=1.0);
        let final_delay = (delay + jitter).clamp(0.0, max_delay_ms) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Policy defining which errors should trigger a retry.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Only retry on concurrency conflicts.
    #[default]
    ConcurrencyConflictsOnly,
    /// Retry on concurrency conflicts and lost database connections.
    ConcurrencyAndTransient,
    /// Custom policy with user-defined predicate.
    Custom(fn(&CommandError) -> bool),
}

impl RetryPolicy {
    /// Determines if an error should trigger a retry.
    pub fn should_retry(&self, error: &CommandError) -> bool {
        match self {
            Self::ConcurrencyConflictsOnly => {
                matches!(error, CommandError::ConcurrencyConflict { .. })
            }
            Self::ConcurrencyAndTransient => matches!(
                error,
                CommandError::ConcurrencyConflict { .. }
                    | CommandError::Store(StoreError::ConnectionFailed(_))
            ),
            Self::Custom(predicate) => predicate(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn delay_stays_within_jitter_bounds(attempt in 0u32..6, base in 1u64..500) {
            let config = RetryConfig {
                base_delay: Duration::from_millis(base),
                ..RetryConfig::default()
            };
            let nominal = (base as f64) * 2f64.powi(attempt as i32);
            let delay = config.delay_for(attempt).as_millis() as f64;

            prop_assert!(delay >= (nominal * 0.75).floor() - 1.0);
            prop_assert!(delay <= nominal * 1.25 + 1.0);
        }
    }

    #[test]
    fn delay_never_exceeds_max_delay() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(50),
            ..RetryConfig::default()
        };
        assert!(config.delay_for(20) <= Duration::from_millis(50));
    }

    #[test]
    fn default_policy_only_retries_conflicts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&CommandError::ConcurrencyConflict { documents: vec![] }));
        assert!(!policy.should_retry(&CommandError::InvalidState("x".to_string())));
        assert!(!policy.should_retry(&CommandError::Store(StoreError::ConnectionFailed(
            "down".to_string()
        ))));
    }

    #[test]
    fn transient_policy_retries_lost_connections() {
        let policy = RetryPolicy::ConcurrencyAndTransient;
        assert!(policy.should_retry(&CommandError::Store(StoreError::ConnectionFailed(
            "down".to_string()
        ))));
    }

    #[test]
    fn settings_are_validated() {
        assert!(MaxRetryAttempts::try_new(0).is_err());
        assert!(MaxRetryAttempts::try_new(11).is_err());
        let config = RetryConfig::from_settings(
            MaxRetryAttempts::try_new(5).unwrap(),
            RetryBaseDelayMs::try_new(20).unwrap(),
        );
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(20));
    }
}
