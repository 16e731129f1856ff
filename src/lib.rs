//! Orchestrated client for the Roblox user-profile API.
//!
//! Sits between application code and the Roblox REST endpoints and handles
//! the operational concerns a naive HTTP wrapper would push onto every
//! caller:
//!
//! - **Caching**: responses are cached with per-entry TTL and LRU eviction
//! - **Rate limiting**: outgoing calls are throttled to a sliding window,
//!   suspending callers instead of rejecting them
//! - **Retries**: transient failures (network faults, 429s, 5xxs) are
//!   retried with exponential backoff, honoring server `Retry-After` hints
//! - **Batching**: bulk lookups deduplicate ids and fan out with bounded
//!   concurrency, preserving input order in the output
//! - **Metrics**: every request feeds a rolling window of latency, success,
//!   and cache-hit statistics
//!
//! # Example
//! ```no_run
//! use rbx_users::{ClientConfig, RobloxClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RobloxClient::new(ClientConfig::default())?;
//!
//! let user = client.get_user(1).await?;
//! println!("{} ({} followers)", user.username, user.follower_count);
//!
//! let profiles = client.get_users_batch(&[1, 2, 3]).await?;
//! println!("fetched {} profiles, stats: {:?}", profiles.len(), client.metrics());
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod resilience;
pub mod transport;

// Re-export the types most callers need directly.
pub use batch::FailurePolicy;
pub use client::RobloxClient;
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use error::{ApiError, Result};
pub use metrics::MetricsSnapshot;
pub use models::{AvatarSizes, UserAvatar, UserProfile};
pub use transport::{Endpoint, Transport};
