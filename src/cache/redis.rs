use std::time::Duration;

use async_trait::async_trait;
use redis::{
    Cmd, FromRedisValue, IntoConnectionInfo, RedisResult, Script, ScriptInvocation,
    aio::MultiplexedConnection,
    cluster::{ClusterClient, ClusterClientBuilder},
    cluster_async::ClusterConnection,
};

use super::{Cache, CacheError, CacheResult};
use crate::config::{RedisCacheConfig, RedisClusterConfig};

/// Deletes KEYS[1] when it holds exactly ARGV[1]. Returns 1 if deleted.
const TAKE_IF_EQ: &str = r#"
local current = redis.call('GET', KEYS[1])
if current and current == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

enum Client {
    Single(redis::Client),
    Cluster(ClusterClient),
}

enum Connection {
    Single(MultiplexedConnection),
    Cluster(ClusterConnection),
}

impl Connection {
    async fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> RedisResult<T> {
        match self {
            Connection::Single(conn) => cmd.query_async(conn).await,
            Connection::Cluster(conn) => cmd.query_async(conn).await,
        }
    }

    async fn run<T: FromRedisValue>(&mut self, script: &ScriptInvocation<'_>) -> RedisResult<T> {
        match self {
            Connection::Single(conn) => script.invoke_async(conn).await,
            Connection::Cluster(conn) => script.invoke_async(conn).await,
        }
    }
}

/// Redis-backed cache, standalone or cluster. Keys are namespaced with `key_prefix`.
pub struct RedisCache {
    client: Client,
    prefix: String,
    take_script: Script,
}

impl RedisCache {
    /// Build the client. Connections are opened lazily per operation.
    pub fn open(config: &RedisCacheConfig) -> CacheResult<Self> {
        let client = match &config.cluster {
            Some(cluster) => Client::Cluster(cluster_client(&config.url, cluster)?),
            None => Client::Single(redis::Client::open(config.url.as_str())?),
        };

        tracing::info!(
            cluster = config.cluster.is_some(),
            key_prefix = %config.key_prefix,
            "Redis logout cache configured"
        );

        Ok(Self {
            client,
            prefix: config.key_prefix.clone(),
            take_script: Script::new(TAKE_IF_EQ),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    async fn connection(&self) -> CacheResult<Connection> {
        Ok(match &self.client {
            Client::Single(client) => {
                Connection::Single(client.get_multiplexed_async_connection().await?)
            }
            Client::Cluster(client) => Connection::Cluster(client.get_async_connection().await?),
        })
    }
}

/// `url` lists the seed nodes separated by commas; the scheme may be omitted.
fn cluster_client(url: &str, config: &RedisClusterConfig) -> CacheResult<ClusterClient> {
    let nodes = url
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(|node| {
            if node.contains("://") {
                node.into_connection_info()
            } else {
                format!("redis://{node}").into_connection_info()
            }
        })
        .collect::<RedisResult<Vec<_>>>()?;

    if nodes.is_empty() {
        return Err(CacheError::Unavailable(
            "no Redis cluster nodes in cache.url".into(),
        ));
    }

    let mut builder = ClusterClientBuilder::new(nodes)
        .retries(config.retries)
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .response_timeout(Duration::from_secs(config.response_timeout_secs));
    if config.read_from_replicas {
        builder = builder.read_from_replicas();
    }
    Ok(builder.build()?)
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value = conn.query(redis::cmd("GET").arg(self.namespaced(key))).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.namespaced(key)).arg(value);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }
        let () = conn.query(&cmd).await?;
        Ok(())
    }

    async fn take_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let key = self.namespaced(key);
        let mut invocation = self.take_script.key(&key);
        invocation.arg(expected);
        let removed: i64 = conn.run(&invocation).await?;
        Ok(removed == 1)
    }
}
