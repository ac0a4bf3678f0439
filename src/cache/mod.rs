//! Keyed byte store shared by all nodes, used to correlate federated logouts.
//!
//! Besides plain reads and writes the store offers [`Cache::take_if_eq`], an
//! atomic compare-and-delete. Consumers that must act on an entry at most once
//! read it, then take it with the bytes they read.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;
use thiserror::Error;

use crate::config::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to encode cache entry: {0}")]
    Encode(String),

    #[error("Failed to decode cache entry: {0}")]
    Decode(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`. Without a TTL the entry lives until taken or evicted.
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key` if and only if it currently holds `expected`.
    ///
    /// Returns true if this call removed the entry. Of several concurrent callers
    /// presenting the same bytes, at most one observes true.
    async fn take_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool>;
}

pub type SharedCache = Arc<dyn Cache>;

/// Build the cache backend selected in configuration.
pub async fn from_config(config: &CacheConfig) -> CacheResult<SharedCache> {
    match config {
        CacheConfig::Memory(memory) => Ok(Arc::new(MemoryCache::new(memory))),
        #[cfg(feature = "redis")]
        CacheConfig::Redis(redis) => Ok(Arc::new(RedisCache::open(redis)?)),
        #[cfg(not(feature = "redis"))]
        CacheConfig::Redis(_) => Err(CacheError::Unavailable(
            "Redis cache is configured but the 'redis' feature is not compiled".into(),
        )),
    }
}
