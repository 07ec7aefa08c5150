//! Redis-backed counter store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, trace, warn};

use super::{bounded_ttl, CounterStore, StoreError, TtlRefresh};
use crate::config::StoreConfig;

/// Increments the counter and applies the expiry in one round trip.
///
/// KEYS[1] = bucket key, ARGV[1] = ttl in milliseconds, ARGV[2] = 1 to
/// refresh the expiry on every increment, 0 to set it only on creation.
const INCREASE_WITH_TTL_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 or ARGV[2] == '1' then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Counter store backed by a Redis (or protocol-compatible) server.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    increase_script: Script,
    key_prefix: String,
    command_timeout: Duration,
}

impl RedisCounterStore {
    /// Connect to the server at `config.url` and verify it answers `PING`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            warn!(url = %config.url, error = %e, "Failed to create Redis client");
            StoreError::Redis(e)
        })?;

        let connect = ConnectionManager::new(client);
        let connection = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))??;

        let store = Self {
            connection,
            increase_script: Script::new(INCREASE_WITH_TTL_SCRIPT),
            key_prefix: config.key_prefix.clone(),
            command_timeout: config.command_timeout,
        };
        store.ping().await?;

        debug!(url = %config.url, prefix = %store.key_prefix, "Connected to Redis counter store");
        Ok(store)
    }

    /// Round-trip a `PING` to the server.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    /// The key actually stored in Redis for a bucket key.
    pub fn namespaced(&self, key: &str) -> String {
        namespaced_key(&self.key_prefix, key)
    }

    async fn bounded<T, F>(&self, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get_counter(&self, key: &str) -> Result<u64, StoreError> {
        let redis_key = self.namespaced(key);
        let mut conn = self.connection.clone();

        let value: Option<u64> = self
            .bounded(async { redis::cmd("GET").arg(&redis_key).query_async(&mut conn).await })
            .await?;

        trace!(key = %redis_key, value = ?value, "Read counter");
        Ok(value.unwrap_or(0))
    }

    async fn increase_with_ttl(
        &self,
        key: &str,
        ttl: Duration,
        refresh: TtlRefresh,
    ) -> Result<u64, StoreError> {
        let redis_key = self.namespaced(key);
        let mut conn = self.connection.clone();
        let mut invocation = self.increase_script.prepare_invoke();
        invocation
            .key(&redis_key)
            .arg(ttl_millis(ttl))
            .arg(refresh_flag(refresh));

        let count: u64 = self
            .bounded(async { invocation.invoke_async(&mut conn).await })
            .await?;

        trace!(key = %redis_key, count = count, refresh = ?refresh, "Incremented counter");
        Ok(count)
    }
}

fn namespaced_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}", prefix, key)
    }
}

/// Expiry in milliseconds, clamped so `PEXPIRE` always accepts it; the
/// script has already run `INCR` when the expiry is applied.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(bounded_ttl(ttl).as_millis()).unwrap_or(u64::MAX)
}

fn refresh_flag(refresh: TtlRefresh) -> u8 {
    match refresh {
        TtlRefresh::OnCreate => 0,
        TtlRefresh::Always => 1,
    }
}
