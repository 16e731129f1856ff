//! Cache configuration

use std::time::Duration;

/// Configuration for the response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    pub capacity: usize,
    /// Lifetime applied to entries inserted without an explicit TTL.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000, default_ttl: Duration::from_secs(300) }
    }
}

impl CacheConfig {
    /// Create a configuration with the given capacity and default TTL.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self { capacity, default_ttl }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than zero".to_string());
        }
        Ok(())
    }
}
