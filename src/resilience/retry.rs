//! Bounded retry execution with error classification and backoff
//!
//! Wraps a fallible async operation and re-attempts it when the configured
//! policy classifies the failure as transient. Non-retryable errors propagate
//! on first occurrence without consuming retry budget, and exhaustion
//! surfaces the last error unchanged so callers always see the original
//! classified failure.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ApiError;

/// Decision returned by a [`RetryPolicy`] for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the computed backoff delay.
    Retry,
    /// Retry after at least the given delay. The executor waits for the
    /// larger of this hint and the computed backoff.
    RetryAfter(Duration),
    /// Do not retry; propagate the error immediately.
    Stop,
}

/// Trait for classifying whether an error should be retried.
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Backoff strategy for calculating delays between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: `base * factor^attempt`, capped at `max`.
    Exponential { base: Duration, factor: f64, max: Duration },
}

impl BackoffStrategy {
    /// Delay before the retry following the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { base, factor, max } => {
                let millis = base.as_millis() as f64 * factor.powi(attempt as i32);
                Duration::from_millis(millis.min(max.as_millis() as f64) as u64)
            }
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff strategy for delays between attempts.
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                base: Duration::from_millis(500),
                factor: 2.0,
                max: Duration::from_secs(30),
            },
        }
    }
}

impl RetryConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let BackoffStrategy::Exponential { factor, .. } = &self.backoff {
            if *factor <= 0.0 {
                return Err("exponential factor must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}

/// Retry policy for the client's error taxonomy: retries `Network`,
/// `RateLimited` (honoring the server's wait hint), and 5xx `Api` errors,
/// stops on everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientErrorPolicy;

impl RetryPolicy<ApiError> for TransientErrorPolicy {
    fn should_retry(&self, error: &ApiError, _attempt: u32) -> RetryDecision {
        match error {
            ApiError::RateLimited { retry_after: Some(hint) } => RetryDecision::RetryAfter(*hint),
            error if error.is_retryable() => RetryDecision::Retry,
            _ => RetryDecision::Stop,
        }
    }
}

/// Executor that re-invokes a fallible async operation per its policy.
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy.
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Create with the default configuration.
    pub fn with_policy(policy: P) -> Self {
        Self::new(RetryConfig::default(), policy)
    }

    /// Execute an operation, retrying transient failures until the budget of
    /// `max_retries` is spent. Returns the operation's value or the last
    /// error unchanged.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let decision = self.policy.should_retry(&error, attempt);
                    if decision == RetryDecision::Stop {
                        debug!(error = %error, "non-retryable error, propagating");
                        return Err(error);
                    }
                    if attempt >= self.config.max_retries {
                        warn!(attempts = attempt + 1, error = %error, "retry budget exhausted");
                        return Err(error);
                    }

                    let backoff = self.config.backoff.delay_for(attempt);
                    let delay = match decision {
                        RetryDecision::RetryAfter(hint) => backoff.max(hint),
                        _ => backoff,
                    };
                    warn!(attempt = attempt + 1, ?delay, error = %error, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
