//! Batch fetch coordination
//!
//! Resolves a list of ids against the cache first, then fetches the misses
//! with bounded concurrency. Duplicate ids are fetched once, and the output
//! mirrors the input's order and multiplicity.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::ApiError;
use crate::metrics::MetricsRecorder;
use crate::resilience::{Clock, SystemClock};

/// How the coordinator reacts when an individual fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop failed ids from the result and keep the rest.
    #[default]
    OmitFailed,
    /// Abort the whole batch on the first failure, dropping any fetches
    /// still in flight.
    FailFast,
}

/// Coordinates a batch of keyed fetches through a shared cache.
pub struct BatchCoordinator<V, C = SystemClock>
where
    V: Clone,
    C: Clock,
{
    cache: Cache<String, V, C>,
    key_prefix: String,
    concurrency: usize,
    policy: FailurePolicy,
    metrics: MetricsRecorder,
}

impl<V, C> BatchCoordinator<V, C>
where
    V: Clone,
    C: Clock + Clone,
{
    /// Create a coordinator over the given cache.
    ///
    /// `key_prefix` namespaces this coordinator's entries inside the shared
    /// cache; `concurrency` bounds how many fetches run at once.
    pub fn new(
        cache: Cache<String, V, C>,
        key_prefix: impl Into<String>,
        concurrency: usize,
        policy: FailurePolicy,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { cache, key_prefix: key_prefix.into(), concurrency: concurrency.max(1), policy, metrics }
    }

    /// Resolve `ids` to values, consulting the cache before fetching.
    ///
    /// Each distinct id is fetched at most once per call. Successful fetches
    /// are written back to the cache. The returned vector follows the input
    /// order, with duplicates repeated; under [`FailurePolicy::OmitFailed`]
    /// failed ids are simply absent.
    pub async fn run<K, F, Fut>(&self, ids: &[K], fetch: F) -> Result<Vec<V>, ApiError>
    where
        K: Eq + Hash + Clone + std::fmt::Display,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, ApiError>>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<K> = ids.iter().filter(|id| seen.insert((*id).clone())).cloned().collect();

        let mut resolved: HashMap<K, V> = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();
        for id in unique {
            let lookup = Instant::now();
            match self.cache.get(&self.cache_key(&id)) {
                Some(value) => {
                    self.metrics.record_cache_hit(lookup.elapsed());
                    resolved.insert(id, value);
                }
                None => misses.push(id),
            }
        }
        debug!(
            requested = ids.len(),
            cached = resolved.len(),
            fetching = misses.len(),
            "resolving batch"
        );

        // The futures are built lazily so only `concurrency` of them run at
        // a time under buffer_unordered.
        let mut fetches = stream::iter(misses.into_iter().map(|id| {
            let fetch = &fetch;
            async move {
                let result = fetch(id.clone()).await;
                (id, result)
            }
        }))
        .buffer_unordered(self.concurrency);

        while let Some((id, result)) = fetches.next().await {
            match result {
                Ok(value) => {
                    self.cache.insert(self.cache_key(&id), value.clone());
                    resolved.insert(id, value);
                }
                Err(error) => match self.policy {
                    FailurePolicy::FailFast => return Err(error),
                    FailurePolicy::OmitFailed => {
                        warn!(%id, error = %error, "omitting failed id from batch result");
                    }
                },
            }
        }
        drop(fetches);

        Ok(ids.iter().filter_map(|id| resolved.get(id).cloned()).collect())
    }

    fn cache_key<K: std::fmt::Display>(&self, id: &K) -> String {
        format!("{}:{}", self.key_prefix, id)
    }
}
