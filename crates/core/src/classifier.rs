//! Pure retry classification with exponential backoff.
//!
//! The classifier turns a [`RetryableFailure`] plus the queue-owned attempt
//! count into a scheduling decision. It is deterministic and side-effect
//! free, so a queue can safely re-derive the decision on crash-and-resume
//! without replaying anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::RetryableFailure;

/// Backoff configuration.
///
/// Passed explicitly into [`RetryClassifier::new`] - never read from
/// process-wide state - so classification stays reproducible in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Ceiling the delay never exceeds.
    pub max_delay: Duration,
    /// Attempt budget; once reached, the job is dead-lettered.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Exponential backoff with the default 2x multiplier.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay,
            max_attempts,
        }
    }
}

/// Scheduling decision for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    /// Re-dispatch after `delay`; `max_attempts` echoes the configured budget
    /// so the queue can surface progress ("attempt 2 of 5").
    Retry { delay: Duration, max_attempts: u32 },
    /// Route to dead-letter handling.
    Fail { reason: String },
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

/// Translates a raised [`RetryableFailure`] into a scheduling decision.
///
/// Stateless: classification is a pure function of the failure kind, the
/// attempt count, and the immutable configuration. No locking is needed to
/// share one classifier across a worker pool.
#[derive(Debug, Clone)]
pub struct RetryClassifier {
    config: BackoffConfig,
}

impl Default for RetryClassifier {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl RetryClassifier {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Decide what the queue should do with a failed attempt.
    ///
    /// `attempt_count` is the number of attempts already made for this
    /// logical job; the queue owns and persists it, the failure value does
    /// not carry it.
    pub fn classify(&self, failure: &RetryableFailure, attempt_count: u32) -> RetryDecision {
        if !failure.kind().is_transient() {
            return RetryDecision::Fail {
                reason: failure.message(),
            };
        }

        if attempt_count >= self.config.max_attempts {
            return RetryDecision::Fail {
                reason: format!(
                    "retry budget exhausted after {} attempts: {}",
                    attempt_count,
                    failure.message()
                ),
            };
        }

        RetryDecision::Retry {
            delay: self.delay_for_attempt(attempt_count),
            max_attempts: self.config.max_attempts,
        }
    }

    /// Delay before re-dispatching after `attempt_count` attempts.
    ///
    /// `base * multiplier^(n-1)`, capped at `max_delay`. Attempt 0 and 1 both
    /// map to the base delay (attempt numbering starts at the first real
    /// execution).
    pub fn delay_for_attempt(&self, attempt_count: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let max_ms = self.config.max_delay.as_millis() as f64;

        let exp = self
            .config
            .multiplier
            .powi(attempt_count.saturating_sub(1) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        Duration::from_millis(delay_ms as u64)
    }
}
