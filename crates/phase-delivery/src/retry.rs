//! Exponential backoff retry policy with jitter.
//!
//! Decides whether a failed delivery gets another attempt and when it
//! may run. Delays grow exponentially from the base, are capped at the
//! maximum, and carry random jitter so a burst of failures does not
//! produce a synchronized burst of retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Retry policy configuration for webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,

    /// Strategy for calculating backoff delays.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(900),
            jitter_factor: 0.1,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles each attempt.
    Exponential,
    /// Delay increases by the base amount each attempt.
    Linear,
}

/// Context for deciding what to do after a failed attempt.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt number that just failed (1-based).
    pub attempt_number: u32,
    /// Error that caused the failure.
    pub error: DeliveryError,
    /// Timestamp of the failed attempt.
    pub failed_at: DateTime<Utc>,
    /// Policy to apply.
    pub policy: RetryPolicy,
}

/// Result of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry at the given time.
    Retry {
        /// Earliest time for the next attempt.
        next_attempt_at: DateTime<Utc>,
    },
    /// Stop retrying; the delivery is exhausted.
    GiveUp {
        /// Why no further attempts will be made.
        reason: String,
    },
}

impl RetryContext {
    /// Creates a new retry context for a failed delivery attempt.
    pub fn new(
        attempt_number: u32,
        error: DeliveryError,
        failed_at: DateTime<Utc>,
        policy: RetryPolicy,
    ) -> Self {
        Self { attempt_number, error, failed_at, policy }
    }

    /// Decides whether to retry and computes the next attempt time.
    pub fn decide_retry(&self) -> RetryDecision {
        if self.attempt_number >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exhausted", self.policy.max_attempts),
            };
        }

        if !self.error.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("non-retryable error: {}", self.error),
            };
        }

        let delay = self.calculate_delay();
        let Ok(chrono_delay) = chrono::Duration::from_std(delay) else {
            return RetryDecision::GiveUp {
                reason: "retry delay duration out of range".to_string(),
            };
        };

        RetryDecision::Retry { next_attempt_at: self.failed_at + chrono_delay }
    }

    /// Calculates the jittered delay until the next attempt.
    fn calculate_delay(&self) -> Duration {
        let base_delay = match self.policy.backoff_strategy {
            BackoffStrategy::Fixed => self.policy.base_delay,
            BackoffStrategy::Linear => self.policy.base_delay * self.attempt_number,
            BackoffStrategy::Exponential => {
                let exponent = self.attempt_number.saturating_sub(1).min(20);
                let multiplier = 2_u32.saturating_pow(exponent);
                self.policy.base_delay * multiplier
            },
        };

        let capped_delay = std::cmp::min(base_delay, self.policy.max_delay);
        apply_jitter(capped_delay, self.policy.jitter_factor)
    }
}

/// Applies jitter to a duration to prevent thundering herd effects.
///
/// Randomizes the delay by plus or minus `jitter_factor`. With a factor
/// of 0.1 a 10s delay lands between 9s and 11s.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> RetryPolicy {
        RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() }
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let ctx = RetryContext::new(
            5,
            DeliveryError::timeout(30),
            Utc::now(),
            RetryPolicy::default(),
        );
        assert!(matches!(ctx.decide_retry(), RetryDecision::GiveUp { .. }));
    }

    #[test]
    fn gives_up_on_non_retryable_error() {
        let ctx = RetryContext::new(
            1,
            DeliveryError::configuration("bad url"),
            Utc::now(),
            RetryPolicy::default(),
        );
        assert!(matches!(ctx.decide_retry(), RetryDecision::GiveUp { .. }));
    }

    #[test]
    fn exponential_delays_double_each_attempt() {
        let policy = no_jitter_policy();
        let failed_at = Utc::now();

        let expected = [5, 10, 20, 40];
        for (attempt, secs) in (1..=4).zip(expected) {
            let ctx = RetryContext::new(
                attempt,
                DeliveryError::endpoint_rejected(500, ""),
                failed_at,
                policy.clone(),
            );
            match ctx.decide_retry() {
                RetryDecision::Retry { next_attempt_at } => {
                    assert_eq!(next_attempt_at, failed_at + chrono::Duration::seconds(secs));
                },
                RetryDecision::GiveUp { reason } => panic!("unexpected give up: {reason}"),
            }
        }
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 20,
            max_delay: Duration::from_secs(900),
            ..no_jitter_policy()
        };
        let failed_at = Utc::now();

        let ctx = RetryContext::new(
            15,
            DeliveryError::endpoint_rejected(500, ""),
            failed_at,
            policy,
        );
        match ctx.decide_retry() {
            RetryDecision::Retry { next_attempt_at } => {
                assert_eq!(next_attempt_at, failed_at + chrono::Duration::seconds(900));
            },
            RetryDecision::GiveUp { reason } => panic!("unexpected give up: {reason}"),
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let duration = Duration::from_secs(100);
        for _ in 0..100 {
            let jittered = apply_jitter(duration, 0.1);
            assert!(jittered >= Duration::from_secs(90));
            assert!(jittered <= Duration::from_secs(110));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let duration = Duration::from_secs(100);
        assert_eq!(apply_jitter(duration, 0.0), duration);
    }
}
