//! Response caching
//!
//! A thread-safe cache combining time-based expiry with bounded capacity:
//! - **Per-entry TTL**: entries expire individually, with a configurable
//!   default lifetime
//! - **LRU eviction**: at capacity, the least recently accessed entry is
//!   dropped to make room
//! - **Lazy expiry**: expired entries are removed when a lookup touches them
//!
//! Cache handles are cheap to clone and share storage, so the same instance
//! serves single lookups and batch fetches alike.

pub mod config;
pub mod core;

pub use config::CacheConfig;
pub use core::Cache;
