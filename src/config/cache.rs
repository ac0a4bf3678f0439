use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Where pending federated logouts are kept between the redirect to the IdP
/// and its response.
///
/// ```toml
/// [cache]
/// type = "redis"
/// url = "redis://cache:6379/0"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheConfig {
    /// Per-process store. Logouts only complete on the node that started them.
    Memory(MemoryCacheConfig),
    Redis(RedisCacheConfig),
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::Memory(MemoryCacheConfig::default())
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Memory(memory) if memory.max_entries == 0 => Err(ConfigError::Validation(
                "cache.max_entries must be at least 1".into(),
            )),
            Self::Redis(redis) if redis.url.trim().is_empty() => Err(ConfigError::Validation(
                "cache.url is required for the redis cache".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryCacheConfig {
    pub max_entries: usize,
    /// Entries dropped at once when `max_entries` is reached, oldest read first.
    pub eviction_batch_size: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            eviction_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// `redis://[user:password@]host:port[/db]`, or a comma-separated seed
    /// node list when `cluster` is set.
    pub url: String,

    #[serde(default = "RedisCacheConfig::default_prefix")]
    pub key_prefix: String,

    #[serde(default)]
    pub cluster: Option<RedisClusterConfig>,
}

impl RedisCacheConfig {
    fn default_prefix() -> String {
        "idp:".into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisClusterConfig {
    pub read_from_replicas: bool,
    pub retries: u32,
    pub connect_timeout_secs: u64,
    pub response_timeout_secs: u64,
}

impl Default for RedisClusterConfig {
    fn default() -> Self {
        Self {
            read_from_replicas: false,
            retries: 3,
            connect_timeout_secs: 5,
            response_timeout_secs: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> CacheConfig {
        toml::from_str(input).unwrap()
    }

    #[test]
    fn redis_defaults_to_standalone_with_prefix() {
        let CacheConfig::Redis(redis) = parse("type = \"redis\"\nurl = \"redis://cache:6379\"")
        else {
            panic!("expected redis cache");
        };
        assert_eq!(redis.key_prefix, "idp:");
        assert!(redis.cluster.is_none());
    }

    #[test]
    fn cluster_table_fills_in_defaults() {
        let CacheConfig::Redis(redis) = parse(
            r#"
            type = "redis"
            url = "a:6379,b:6379"
            cluster = { read_from_replicas = true }
        "#,
        ) else {
            panic!("expected redis cache");
        };
        let cluster = redis.cluster.unwrap();
        assert!(cluster.read_from_replicas);
        assert_eq!(cluster.retries, 3);
    }

    #[test]
    fn blank_redis_url_is_rejected() {
        let config = parse("type = \"redis\"\nurl = \"  \"");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_capacity_memory_cache_is_rejected() {
        let config = parse("type = \"memory\"\nmax_entries = 0");
        assert!(config.validate().is_err());
    }
}
