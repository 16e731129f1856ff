//! Resilience patterns for outgoing API traffic
//!
//! This module provides the two admission-control pieces every fetch passes
//! through on a cache miss:
//! - **Sliding-window rate limiting**: at most N admissions in any trailing
//!   window, suspending (never rejecting) callers over the limit
//! - **Retry execution**: bounded, classified retries with exponential
//!   backoff and server wait-hint support
//!
//! Both are clock-abstracted so tests can control time deterministically.

pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::SlidingWindowLimiter;
pub use retry::{
    BackoffStrategy, RetryConfig, RetryDecision, RetryExecutor, RetryPolicy, TransientErrorPolicy,
};
