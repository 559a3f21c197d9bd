//! Redis-backed storage backend implementation.
//!
//! This module provides [`RedisBackend`], which implements the
//! [`StorageBackend`](warden_storage::StorageBackend) trait over a single
//! multiplexed Redis connection.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use redis::{Client, RedisResult, Script, aio::MultiplexedConnection};
use warden_storage::{BackendInfo, StorageBackend, StorageError, StorageResult};

use crate::{
    config::RedisBackendConfig,
    error::{RedisStorageError, Result, redis_error_to_storage_error},
};

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE_LUA: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed implementation of [`StorageBackend`].
///
/// # Command Mapping
///
/// | StorageBackend | Redis |
/// |----------------|-------|
/// | `get` / `get_many` | `GET` / `MGET` |
/// | `set_with_ttl` | `SET key value PX ttl` |
/// | `set_many_with_ttl` | `MULTI`/`EXEC` pipeline of `SET .. PX` |
/// | `set_if_absent` | `SET key value NX PX ttl` |
/// | `compare_and_delete` | Lua script (`GET` + `DEL`) |
/// | `scan` | `SCAN cursor MATCH pattern COUNT n` until the cursor returns to 0 |
/// | `info` | `INFO` + `DBSIZE` |
///
/// TTLs are sent in milliseconds. Redis rejects `PX 0`, so a zero TTL is
/// sent as one millisecond.
///
/// # Thread Safety
///
/// The multiplexed connection is cloned per operation; clones share one
/// socket and pipeline requests over it. After [`close`](StorageBackend::close)
/// every operation fails with [`StorageError::Closed`].
#[derive(Clone)]
pub struct RedisBackend {
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    compare_and_delete: Arc<Script>,
    command_timeout: Duration,
    scan_count: u32,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed a password, so it is not kept on the backend.
        f.debug_struct("RedisBackend")
            .field("connected", &self.connection.read().is_some())
            .field("command_timeout", &self.command_timeout)
            .field("scan_count", &self.scan_count)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Opens a connection described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The URL cannot be parsed
    /// - The server cannot be reached within the connect timeout
    ///
    /// # Example
    ///
    /// ```no_run
    /// use warden_storage::StorageBackend;
    /// use warden_storage_redis::{RedisBackend, RedisBackendConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = RedisBackendConfig::builder().url("redis://localhost:6379").build()?;
    /// let backend = RedisBackend::connect(config).await?;
    /// backend.ping().await?;
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(config))]
    pub async fn connect(config: RedisBackendConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::open(config.url())?;
        let connection =
            tokio::time::timeout(config.connect_timeout(), client.get_multiplexed_async_connection())
                .await
                .map_err(|_| RedisStorageError::ConnectTimeout(config.connect_timeout()))??;

        tracing::info!(scan_count = config.scan_count(), "connected to Redis");

        Ok(Self::from_connection(connection, &config))
    }

    /// Wraps an already established connection.
    #[must_use]
    pub fn from_connection(connection: MultiplexedConnection, config: &RedisBackendConfig) -> Self {
        Self {
            connection: Arc::new(RwLock::new(Some(connection))),
            compare_and_delete: Arc::new(Script::new(COMPARE_AND_DELETE_LUA)),
            command_timeout: config.command_timeout(),
            scan_count: config.scan_count(),
        }
    }

    fn connection(&self) -> StorageResult<MultiplexedConnection> {
        self.connection.read().clone().ok_or(StorageError::Closed)
    }

    /// Runs one round trip against a connection clone, bounded by the command timeout.
    async fn run<T, F, Fut>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let connection = self.connection()?;
        match tokio::time::timeout(self.command_timeout, op(connection)).await {
            Ok(result) => result.map_err(redis_error_to_storage_error),
            Err(_) => {
                tracing::warn!(timeout = ?self.command_timeout, "Redis command timed out");
                Err(StorageError::timeout())
            },
        }
    }
}

/// Converts a TTL to the millisecond argument of `PX`/`PEXPIRE`.
fn px(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Extracts memory and client figures from an `INFO` reply.
pub(crate) fn parse_info(info: &str, key_count: u64) -> BackendInfo {
    let mut parsed = BackendInfo { key_count, ..BackendInfo::default() };
    for line in info.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        match field {
            "used_memory" => parsed.used_memory_bytes = value.parse().unwrap_or_default(),
            "connected_clients" => parsed.connected_clients = value.parse().unwrap_or_default(),
            _ => {},
        }
    }
    parsed
}

#[async_trait]
impl StorageBackend for RedisBackend {
    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let value: Option<Vec<u8>> = self
            .run(|mut conn| async move { redis::cmd("GET").arg(key).query_async(&mut conn).await })
            .await?;
        Ok(value.map(Bytes::from))
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn get_many(&self, keys: &[String]) -> StorageResult<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<Vec<u8>>> = self
            .run(|mut conn| async move { redis::cmd("MGET").arg(keys).query_async(&mut conn).await })
            .await?;
        Ok(values.into_iter().map(|value| value.map(Bytes::from)).collect())
    }

    #[tracing::instrument(skip(self, value), fields(value_len = value.len()))]
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.run(|mut conn| async move {
            redis::cmd("SET").arg(key).arg(value).arg("PX").arg(px(ttl)).query_async(&mut conn).await
        })
        .await
    }

    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    async fn set_many_with_ttl(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &entries {
            pipe.cmd("SET").arg(key).arg(value).arg("PX").arg(px(ttl)).ignore();
        }
        self.run(|mut conn| async move { pipe.query_async(&mut conn).await }).await
    }

    #[tracing::instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<bool> {
        let reply: Option<String> = self
            .run(|mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(px(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(|mut conn| async move { redis::cmd("DEL").arg(keys).query_async(&mut conn).await })
            .await
    }

    #[tracing::instrument(skip(self, expected))]
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StorageResult<bool> {
        let script = Arc::clone(&self.compare_and_delete);
        let deleted: i64 = self
            .run(|mut conn| async move {
                let mut invocation = script.key(key);
                invocation.arg(expected);
                invocation.invoke_async(&mut conn).await
            })
            .await?;
        Ok(deleted == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let count: u64 = self
            .run(|mut conn| async move { redis::cmd("EXISTS").arg(key).query_async(&mut conn).await })
            .await?;
        Ok(count > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let updated: i64 = self
            .run(|mut conn| async move {
                redis::cmd("PEXPIRE").arg(key).arg(px(ttl)).query_async(&mut conn).await
            })
            .await?;
        Ok(updated == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn scan(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .run(|mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(self.scan_count)
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once while the keyspace is rehashing.
        keys.sort_unstable();
        keys.dedup();
        tracing::debug!(count = keys.len(), "scan complete");
        Ok(keys)
    }

    #[tracing::instrument(skip(self))]
    async fn ping(&self) -> StorageResult<()> {
        let reply: String =
            self.run(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await }).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StorageError::internal(format!("unexpected PING reply: {reply}")))
        }
    }

    #[tracing::instrument(skip(self))]
    async fn info(&self) -> StorageResult<BackendInfo> {
        let info: String =
            self.run(|mut conn| async move { redis::cmd("INFO").query_async(&mut conn).await }).await?;
        let key_count: u64 =
            self.run(|mut conn| async move { redis::cmd("DBSIZE").query_async(&mut conn).await }).await?;
        Ok(parse_info(&info, key_count))
    }

    #[tracing::instrument(skip(self))]
    async fn close(&self) -> StorageResult<()> {
        if self.connection.write().take().is_some() {
            tracing::info!("Redis connection released");
        }
        Ok(())
    }
}
