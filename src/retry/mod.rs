//! Retry policies with bounded exponential backoff.
//!
//! A [`RetryPolicy`] owns the backoff schedule and the eligibility rules;
//! [`RetryPolicy::evaluate`] is a pure function of `(failure, retry_count,
//! policy)` and is the unit under test for the backoff properties. The queue
//! consults the policy registered for an operation type after every handler
//! failure.

pub mod classify;

use std::time::Duration;

use rand::Rng;

pub use classify::{ErrorCategory, SyncFailure};

/// Decision reason when the retry count hit the policy limit.
pub const REASON_RETRY_LIMIT: &str = "retry limit reached";

/// Parameters governing retry timing and eligibility.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first failure before giving up.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on any computed delay.
    pub max_delay: Duration,
    /// Exponential growth factor per retry.
    pub multiplier: f64,
    /// Whether to spread delays with random jitter.
    pub use_jitter: bool,
    /// Jitter amplitude: delays are multiplied by `1 + U(-f, +f)`.
    pub jitter_factor: f64,
    /// Categories eligible for retry.
    pub retryable_categories: Vec<ErrorCategory>,
    /// Status codes eligible for retry; only consulted when the failure
    /// carries a status (network failures never do).
    pub retryable_status_codes: Vec<u16>,
}

impl RetryPolicy {
    /// General-purpose policy: 1s, 2s, 4s, 8s, 16s.
    pub fn standard() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            use_jitter: false,
            jitter_factor: 0.1,
            retryable_categories: vec![
                ErrorCategory::Network,
                ErrorCategory::Server,
                ErrorCategory::Timeout,
                ErrorCategory::RateLimit,
            ],
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }

    /// Money-movement policy: more retries, shorter initial delay.
    pub fn critical() -> Self {
        Self {
            max_retries: 7,
            initial_delay: Duration::from_millis(500),
            ..Self::standard()
        }
    }

    /// Background-noise policy: fewer retries, longer delays.
    pub fn conservative() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            ..Self::standard()
        }
    }

    /// Computes the backoff delay for the given retry ordinal.
    ///
    /// `delay(n) = min(initial * multiplier^n, max)`, optionally jittered by
    /// `1 + U(-jitter_factor, +jitter_factor)` and floored at zero.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry_count as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());

        let scaled = if self.use_jitter && self.jitter_factor > 0.0 {
            let mut rng = rand::rng();
            let jitter = rng.random_range(-self.jitter_factor..=self.jitter_factor);
            capped * (1.0 + jitter)
        } else {
            capped
        };

        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Decides whether a failed attempt should be retried.
    ///
    /// Pure: no clocks, no randomness beyond the jitter inside the returned
    /// delay. Rate-limited failures honor the server's `Retry-After` by
    /// taking the larger of it and the computed backoff.
    pub fn evaluate(&self, failure: &SyncFailure, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            return RetryDecision::give_up(REASON_RETRY_LIMIT);
        }

        if !self.retryable_categories.contains(&failure.category) {
            return RetryDecision::give_up("category is not retryable");
        }

        if let Some(status) = failure.status {
            if !self.retryable_status_codes.contains(&status) {
                return RetryDecision::give_up("status code is not retryable");
            }
        }

        let mut delay = self.delay_for(retry_count);
        if failure.category == ErrorCategory::RateLimit {
            if let Some(seconds) = failure.retry_after {
                delay = delay.max(Duration::from_secs(seconds));
            }
        }

        RetryDecision {
            retry: true,
            reason: "transient failure, retry scheduled",
            delay: Some(delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of a retry evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub reason: &'static str,
    pub delay: Option<Duration>,
}

impl RetryDecision {
    fn give_up(reason: &'static str) -> Self {
        Self {
            retry: false,
            reason,
            delay: None,
        }
    }
}
