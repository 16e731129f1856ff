//! Sliding-window rate limiting for outgoing API calls
//!
//! Permits at most `capacity` admissions within any trailing interval of
//! `window` length. Unlike a token bucket, `acquire` never rejects: callers
//! suspend until a slot in the window frees up. This models the remote API's
//! soft rate limiting rather than a hard circuit breaker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use super::clock::{Clock, SystemClock};

/// Sliding-window call admission control.
///
/// Waiters queue on an async mutex, so admission order is FIFO and no caller
/// is starved for longer than one window length per admitted slot.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use rbx_users::resilience::SlidingWindowLimiter;
///
/// # async fn example() {
/// let limiter = SlidingWindowLimiter::new(120, Duration::from_secs(60)).unwrap();
/// limiter.acquire().await; // suspends until the window has capacity
/// # }
/// ```
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    capacity: usize,
    window: Duration,
    admissions: tokio::sync::Mutex<VecDeque<Instant>>,
    clock: C,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a new limiter with the system clock.
    pub fn new(capacity: usize, window: Duration) -> Result<Self, String> {
        Self::with_clock(capacity, window, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a new limiter with a custom clock (useful for testing).
    pub fn with_clock(capacity: usize, window: Duration, clock: C) -> Result<Self, String> {
        if capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if window.is_zero() {
            return Err("window must be greater than zero".to_string());
        }
        Ok(Self {
            capacity,
            window,
            admissions: tokio::sync::Mutex::new(VecDeque::with_capacity(capacity)),
            clock,
        })
    }

    /// Suspend until the window has capacity, then record the admission.
    ///
    /// The lock is held across the capacity wait: the head-of-line caller is
    /// admitted as soon as the oldest timestamp leaves the window, and every
    /// other waiter keeps its position in the mutex queue.
    pub async fn acquire(&self) {
        let mut admissions = self.admissions.lock().await;
        loop {
            let now = self.clock.now();
            Self::prune(&mut admissions, now, self.window);

            if admissions.len() < self.capacity {
                admissions.push_back(now);
                return;
            }

            let oldest = admissions[0];
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(?wait, capacity = self.capacity, "rate window full, waiting for a slot");
            tokio::time::sleep(wait).await;
        }
    }

    /// Non-blocking admission attempt. Returns `false` when the window is
    /// full or another caller currently holds the window lock.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut admissions) = self.admissions.try_lock() else {
            return false;
        };
        let now = self.clock.now();
        Self::prune(&mut admissions, now, self.window);
        if admissions.len() < self.capacity {
            admissions.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of admissions currently inside the trailing window.
    pub async fn in_window(&self) -> usize {
        let mut admissions = self.admissions.lock().await;
        let now = self.clock.now();
        Self::prune(&mut admissions, now, self.window);
        admissions.len()
    }

    fn prune(admissions: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while admissions.front().is_some_and(|stamp| now.duration_since(*stamp) >= window) {
            admissions.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::resilience::MockClock;

    #[tokio::test]
    async fn admits_up_to_capacity_without_waiting() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60)).unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test]
    async fn try_acquire_rejects_when_full() {
        let clock = MockClock::new();
        let limiter =
            SlidingWindowLimiter::with_clock(2, Duration::from_secs(60), clock.clone()).unwrap();

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // The window slides: once the oldest admission ages out, a slot frees.
        clock.advance(Duration::from_secs(60));
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn never_exceeds_capacity_in_any_trailing_window() {
        let capacity = 3;
        let window = Duration::from_millis(200);
        let limiter = Arc::new(SlidingWindowLimiter::new(capacity, window).unwrap());

        let mut tasks = Vec::new();
        for _ in 0..(capacity * 2 + 1) {
            let limiter = Arc::clone(&limiter);
            tasks.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for task in tasks {
            stamps.push(task.await.unwrap());
        }
        stamps.sort();

        // Timestamp sampling: every admission and the (capacity)th one after
        // it must be at least one window apart.
        for pair in stamps.windows(capacity + 1) {
            let spread = pair[capacity].duration_since(pair[0]);
            assert!(spread >= window, "window held {} admissions in {:?}", capacity + 1, spread);
        }
    }

    #[tokio::test]
    async fn blocked_acquire_resumes_when_window_slides() {
        let limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_millis(100)).unwrap());
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(SlidingWindowLimiter::new(0, Duration::from_secs(60)).is_err());
        assert!(SlidingWindowLimiter::new(10, Duration::ZERO).is_err());
    }
}
