//! Client facade and session lifecycle
//!
//! `RobloxClient` wires the cache, rate limiter, retry executor, batch
//! coordinator, and metrics recorder around a [`Transport`]. Every public
//! operation follows the same pipeline on a cache miss: rate-window
//! admission, classified retries around the transport call, metric
//! recording, and write-back into the cache.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::batch::BatchCoordinator;
use crate::cache::{Cache, CacheConfig};
use crate::config::{ClientConfig, ConfigError};
use crate::error::{ApiError, Result};
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::models::{
    AvatarSizes, CountPayload, DataEnvelope, ThumbnailPayload, UserAvatar, UserProfile,
    UsernameMatch,
};
use crate::resilience::{
    BackoffStrategy, RetryConfig, RetryExecutor, SlidingWindowLimiter, TransientErrorPolicy,
};
use crate::transport::{Endpoint, HttpTransport, Transport};

/// Ids per chunk when prefetching with [`RobloxClient::warm_cache`].
const WARM_CHUNK_SIZE: usize = 50;

/// Tracks in-flight operations so `close()` can drain them.
struct SessionGate {
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

/// RAII token for one in-flight operation.
struct FlightGuard {
    gate: Arc<SessionGate>,
}

impl SessionGate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    /// Register an operation, failing once the gate is closed.
    fn enter(self: &Arc<Self>) -> Result<FlightGuard> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ApiError::Network("client is closed".into()));
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        // Re-check after registering so close() cannot slip between the load
        // and the increment without seeing this operation.
        if self.closed.load(Ordering::Acquire) {
            self.exit();
            return Err(ApiError::Network("client is closed".into()));
        }
        Ok(FlightGuard { gate: Arc::clone(self) })
    }

    fn exit(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Refuse new operations and wait for the in-flight count to reach zero.
    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        loop {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

/// Async client for the Roblox user-profile API.
///
/// The client is cheap to share behind an `Arc`; all internal state is
/// already synchronized. Dropping without [`close`](Self::close) is safe,
/// closing first guarantees no request is cut off mid-flight.
///
/// # Example
/// ```no_run
/// use rbx_users::{ClientConfig, RobloxClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RobloxClient::new(ClientConfig::default())?;
/// let user = client.get_user(1).await?;
/// println!("{} joined {:?}", user.username, user.created);
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct RobloxClient {
    transport: Arc<dyn Transport>,
    cache: Cache<String, Value>,
    limiter: SlidingWindowLimiter,
    retry: RetryExecutor<TransientErrorPolicy>,
    batch: BatchCoordinator<Value>,
    metrics: MetricsRecorder,
    gate: Arc<SessionGate>,
    config: ClientConfig,
}

impl RobloxClient {
    /// Create a client over the default HTTP transport.
    pub fn new(config: ClientConfig) -> std::result::Result<Self, ConfigError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client from the defaults overlaid with `RBX_USERS_*`
    /// environment variables.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env())
    }

    /// Create a client over a custom transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        if config.debug {
            debug!(?config, "client configured");
        }

        let cache = Cache::new(CacheConfig::new(config.cache_capacity, config.cache_ttl));
        let limiter = SlidingWindowLimiter::new(config.rate_limit_capacity, config.rate_limit_window)
            .map_err(ConfigError::Invalid)?;
        let retry = RetryExecutor::new(
            RetryConfig {
                max_retries: config.max_retries,
                backoff: BackoffStrategy::Exponential {
                    base: config.retry_base_delay,
                    factor: 2.0,
                    max: config.retry_max_delay,
                },
            },
            TransientErrorPolicy,
        );
        let metrics = MetricsRecorder::new();
        let batch = BatchCoordinator::new(
            cache.clone(),
            "user",
            config.batch_concurrency,
            config.failure_policy,
            metrics.clone(),
        );

        Ok(Self {
            transport,
            cache,
            limiter,
            retry,
            batch,
            metrics,
            gate: SessionGate::new(),
            config,
        })
    }

    /// Fetch a user's profile by id, including follower, following, and
    /// friend counts. A failed count lookup degrades to 0 rather than
    /// failing the profile.
    pub async fn get_user(&self, user_id: u64) -> Result<UserProfile> {
        let value =
            self.run_cached(format!("user:{user_id}"), || self.fetch_profile(user_id)).await?;
        decode(value)
    }

    /// Resolve a username to its id, then fetch the profile. An unknown
    /// username maps to [`ApiError::NotFound`].
    pub async fn get_user_by_username(&self, username: &str) -> Result<UserProfile> {
        let key = format!("username:{}", username.to_ascii_lowercase());
        let value = self
            .run_cached(key, || async {
                let body = json!({ "usernames": [username], "excludeBannedUsers": true });
                let response = self.post(Endpoint::Users, "/v1/usernames/users", body).await?;
                let envelope: DataEnvelope<UsernameMatch> = decode(response)?;
                match envelope.data.first() {
                    Some(resolved) => Ok(Value::from(resolved.id)),
                    None => Err(ApiError::NotFound(format!("username {username}"))),
                }
            })
            .await?;

        let user_id = value
            .as_u64()
            .ok_or_else(|| ApiError::Api { status: 200, message: "cached id is not a u64".into() })?;
        self.get_user(user_id).await
    }

    /// Fetch multiple profiles at once. Duplicate ids are fetched a single
    /// time; the output follows the input's order and multiplicity. The
    /// configured [`FailurePolicy`](crate::batch::FailurePolicy) decides how
    /// per-id failures are handled.
    pub async fn get_users_batch(&self, user_ids: &[u64]) -> Result<Vec<UserProfile>> {
        let _guard = self.gate.enter()?;
        if user_ids.len() > self.config.max_batch_size {
            return Err(ApiError::Api {
                status: 400,
                message: format!(
                    "batch of {} ids exceeds the maximum of {}",
                    user_ids.len(),
                    self.config.max_batch_size
                ),
            });
        }

        let values = self
            .batch
            .run(user_ids, |user_id| async move {
                let started = Instant::now();
                let result = self.fetch_profile(user_id).await;
                self.metrics.record(started.elapsed(), result.is_ok(), false);
                result
            })
            .await?;
        values.into_iter().map(decode).collect()
    }

    /// Fetch a user's avatar URLs at the default sizes.
    pub async fn get_user_avatar(&self, user_id: u64) -> Result<UserAvatar> {
        self.get_user_avatar_with_sizes(user_id, AvatarSizes::default()).await
    }

    /// Fetch a user's avatar URLs at explicit sizes. A failed thumbnail
    /// lookup degrades to an empty URL instead of failing the call.
    pub async fn get_user_avatar_with_sizes(
        &self,
        user_id: u64,
        sizes: AvatarSizes,
    ) -> Result<UserAvatar> {
        let key = format!(
            "avatar:{user_id}:{}:{}:{}",
            sizes.headshot, sizes.bust, sizes.full_body
        );
        let value = self
            .run_cached_if(
                key,
                || async {
                    let (headshot, bust, full_body) = tokio::join!(
                        self.fetch_thumbnail("/v1/users/avatar-headshot", user_id, &sizes.headshot),
                        self.fetch_thumbnail("/v1/users/avatar-bust", user_id, &sizes.bust),
                        self.fetch_thumbnail("/v1/users/avatar", user_id, &sizes.full_body),
                    );
                    Ok(json!({
                        "headshot": degrade(headshot, user_id, "headshot"),
                        "bust": degrade(bust, user_id, "bust"),
                        "fullBody": degrade(full_body, user_id, "full body"),
                    }))
                },
                // An avatar with every URL degraded is not cached, so the
                // next call retries the thumbnail endpoints.
                |value| {
                    ["headshot", "bust", "fullBody"]
                        .iter()
                        .any(|field| !string_field(value, field).is_empty())
                },
            )
            .await?;

        Ok(UserAvatar {
            user_id,
            headshot_url: string_field(&value, "headshot"),
            bust_url: string_field(&value, "bust"),
            full_body_url: string_field(&value, "fullBody"),
        })
    }

    /// Number of users following this user.
    pub async fn get_follower_count(&self, user_id: u64) -> Result<u64> {
        self.count(user_id, "followers").await
    }

    /// Number of users this user follows.
    pub async fn get_following_count(&self, user_id: u64) -> Result<u64> {
        self.count(user_id, "followings").await
    }

    /// Number of friends this user has.
    pub async fn get_friend_count(&self, user_id: u64) -> Result<u64> {
        self.count(user_id, "friends").await
    }

    /// Most recent followers, at most 100.
    pub async fn get_followers(&self, user_id: u64, limit: usize) -> Result<Vec<UserProfile>> {
        self.social_list(user_id, "followers", limit).await
    }

    /// Users this user follows, at most 100.
    pub async fn get_following(&self, user_id: u64, limit: usize) -> Result<Vec<UserProfile>> {
        self.social_list(user_id, "followings", limit).await
    }

    /// This user's friends, at most 100.
    pub async fn get_friends(&self, user_id: u64, limit: usize) -> Result<Vec<UserProfile>> {
        self.social_list(user_id, "friends", limit).await
    }

    /// Prefetch profiles into the cache in chunks. Failures are logged and
    /// skipped; warming never fails the caller.
    pub async fn warm_cache(&self, user_ids: &[u64]) {
        for chunk in user_ids.chunks(WARM_CHUNK_SIZE) {
            if let Err(error) = self.get_users_batch(chunk).await {
                warn!(chunk_len = chunk.len(), %error, "cache warm chunk failed, skipping");
            }
        }
    }

    /// Aggregated request metrics for this client instance.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.gate.closed.load(Ordering::Acquire)
    }

    /// Refuse new operations, then wait until every in-flight operation has
    /// finished. Subsequent calls fail with a `Network` error. Closing an
    /// already-closed client is a no-op.
    pub async fn close(&self) {
        self.gate.close().await;
        debug!("client closed, in-flight operations drained");
    }

    /// Cache-or-fetch pipeline shared by every read operation.
    async fn run_cached<F, Fut>(&self, key: String, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        self.run_cached_if(key, fetch, |_| true).await
    }

    /// Like [`run_cached`](Self::run_cached), but only writes back values the
    /// predicate accepts. Rejected values are still returned to the caller,
    /// the next call just fetches again.
    async fn run_cached_if<F, Fut, P>(&self, key: String, fetch: F, should_cache: P) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
        P: FnOnce(&Value) -> bool,
    {
        let _guard = self.gate.enter()?;
        let started = Instant::now();

        if let Some(value) = self.cache.get(&key) {
            self.metrics.record_cache_hit(started.elapsed());
            return Ok(value);
        }

        let result = fetch().await;
        match &result {
            Ok(value) => {
                if should_cache(value) {
                    self.cache.insert(key, value.clone());
                }
                self.metrics.record(started.elapsed(), true, false);
            }
            Err(error) => {
                self.metrics.record(started.elapsed(), false, false);
                debug!(%error, "request failed");
            }
        }
        result
    }

    /// One logical GET: a single rate-window admission, then classified
    /// retries around the transport call.
    async fn request(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        self.limiter.acquire().await;
        self.retry.execute(|| self.transport.get(endpoint, path, query)).await
    }

    async fn post(&self, endpoint: Endpoint, path: &str, body: Value) -> Result<Value> {
        self.limiter.acquire().await;
        self.retry.execute(|| self.transport.post(endpoint, path, body.clone())).await
    }

    /// Profile payload with the three social counts folded in. Counts are
    /// fetched concurrently and default to 0 on failure.
    async fn fetch_profile(&self, user_id: u64) -> Result<Value> {
        let profile_path = format!("/v1/users/{user_id}");
        let (profile, followers, followings, friends) = tokio::join!(
            self.request(Endpoint::Users, &profile_path, &[]),
            self.fetch_count(user_id, "followers"),
            self.fetch_count(user_id, "followings"),
            self.fetch_count(user_id, "friends"),
        );

        let mut value = profile?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("followerCount".into(), count_or_zero(followers, user_id));
            fields.insert("followingCount".into(), count_or_zero(followings, user_id));
            fields.insert("friendCount".into(), count_or_zero(friends, user_id));
        }
        Ok(value)
    }

    async fn fetch_count(&self, user_id: u64, kind: &str) -> Result<u64> {
        let path = format!("/v1/users/{user_id}/{kind}/count");
        let value = self.request(Endpoint::Friends, &path, &[]).await?;
        let payload: CountPayload = decode(value)?;
        Ok(payload.count)
    }

    async fn fetch_thumbnail(&self, path: &str, user_id: u64, size: &str) -> Result<String> {
        let query = [
            ("userIds", user_id.to_string()),
            ("size", size.to_string()),
            ("format", "Png".to_string()),
            ("isCircular", "false".to_string()),
        ];
        let value = self.request(Endpoint::Thumbnails, path, &query).await?;
        let envelope: DataEnvelope<ThumbnailPayload> = decode(value)?;
        Ok(envelope.data.into_iter().next().map(|entry| entry.image_url).unwrap_or_default())
    }

    async fn count(&self, user_id: u64, kind: &str) -> Result<u64> {
        let value = self
            .run_cached(format!("{kind}:count:{user_id}"), || async {
                self.fetch_count(user_id, kind).await.map(Value::from)
            })
            .await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn social_list(
        &self,
        user_id: u64,
        kind: &str,
        limit: usize,
    ) -> Result<Vec<UserProfile>> {
        let limit = limit.clamp(1, 100);
        let value = self
            .run_cached(format!("{kind}:{user_id}:{limit}"), || async {
                let path = format!("/v1/users/{user_id}/{kind}");
                self.request(Endpoint::Friends, &path, &[("limit", limit.to_string())]).await
            })
            .await?;
        let envelope: DataEnvelope<UserProfile> = decode(value)?;
        Ok(envelope.data)
    }
}

/// Decode a cached or freshly fetched payload into its typed model. A shape
/// mismatch means the API changed under us, surfaced as an `Api` error.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| ApiError::Api { status: 200, message: format!("unexpected payload shape: {err}") })
}

fn count_or_zero(result: Result<u64>, user_id: u64) -> Value {
    match result {
        Ok(count) => Value::from(count),
        Err(error) => {
            warn!(user_id, %error, "count lookup failed, defaulting to 0");
            Value::from(0u64)
        }
    }
}

fn degrade(result: Result<String>, user_id: u64, kind: &str) -> String {
    match result {
        Ok(url) => url,
        Err(error) => {
            warn!(user_id, kind, %error, "thumbnail lookup failed, degrading to empty URL");
            String::new()
        }
    }
}

fn string_field(value: &Value, field: &str) -> String {
    value.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn gate_drains_before_close_returns() {
        let gate = SessionGate::new();
        let guard = gate.enter().unwrap();

        let closing = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.close().await })
        };

        // close() must not complete while an operation is in flight.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closing.is_finished());

        drop(guard);
        closing.await.unwrap();
        assert!(gate.enter().is_err());
    }

    #[tokio::test]
    async fn closed_gate_rejects_new_operations() {
        let gate = SessionGate::new();
        gate.close().await;

        let error = gate.enter().err().unwrap();
        assert_eq!(error, ApiError::Network("client is closed".into()));
    }

    #[test]
    fn decode_reports_shape_mismatches() {
        let result: Result<CountPayload> = decode(json!({"count": "many"}));
        assert!(matches!(result, Err(ApiError::Api { status: 200, .. })));
    }
}
