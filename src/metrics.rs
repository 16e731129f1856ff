//! Rolling request metrics
//!
//! Records the outcome of each logical request into a bounded rolling
//! window and aggregates them on demand. The window holds the most recent
//! samples only, so long-running sessions report recent behavior rather
//! than lifetime averages.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Maximum number of samples retained in the rolling window.
const MAX_SAMPLES: usize = 1000;

/// A single recorded request outcome.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    /// Wall time the request took, including retries.
    pub duration: Duration,
    /// Whether the request ultimately succeeded.
    pub success: bool,
    /// Whether the result came from the cache without network traffic.
    pub cache_hit: bool,
}

/// Aggregated view over the current rolling window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Number of samples in the window.
    pub sample_count: usize,
    /// Mean request duration across the window.
    pub avg_duration: Duration,
    /// Share of successful requests, as a percentage (0.0 to 100.0).
    pub success_rate: f64,
    /// Share of cache-served requests, as a percentage (0.0 to 100.0).
    pub cache_hit_rate: f64,
}

impl MetricsSnapshot {
    fn empty() -> Self {
        Self {
            sample_count: 0,
            avg_duration: Duration::ZERO,
            success_rate: 0.0,
            cache_hit_rate: 0.0,
        }
    }
}

/// Shared recorder for request outcomes.
///
/// Clones share the same window, so the recorder can be handed to the batch
/// coordinator and the client facade alike.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    samples: Arc<Mutex<VecDeque<RequestMetric>>>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self { samples: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_SAMPLES))) }
    }

    /// Record one request outcome. When the window is full the oldest sample
    /// is dropped.
    pub fn record(&self, duration: Duration, success: bool, cache_hit: bool) {
        let metric = RequestMetric { duration, success, cache_hit };
        let mut samples = self.lock();
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(metric);
    }

    /// Record a request served entirely from the cache.
    pub fn record_cache_hit(&self, duration: Duration) {
        self.record(duration, true, true);
    }

    /// Aggregate the current window. An empty window reports zeros.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.lock();
        if samples.is_empty() {
            return MetricsSnapshot::empty();
        }

        let count = samples.len();
        let total: Duration = samples.iter().map(|m| m.duration).sum();
        let successes = samples.iter().filter(|m| m.success).count();
        let hits = samples.iter().filter(|m| m.cache_hit).count();

        MetricsSnapshot {
            sample_count: count,
            avg_duration: total / count as u32,
            success_rate: successes as f64 / count as f64 * 100.0,
            cache_hit_rate: hits as f64 / count as f64 * 100.0,
        }
    }

    /// Discard all recorded samples.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RequestMetric>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
