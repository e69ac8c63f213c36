//! Redis-backed key/value store.

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{info, Instrument};

use super::KvStore;
use crate::error::{Backend, StoreError};

#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

fn kv_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("kv.command", db.system = "redis", db.operation = operation)
}

fn kv_error(operation: &'static str, err: redis::RedisError) -> StoreError {
    StoreError::new(Backend::KeyValue, operation, err)
}

impl RedisStore {
    /// Connect and verify the connection with `PING`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url).context("invalid Redis URL")?;
        let mut connection_manager = tokio::time::timeout(
            Duration::from_secs(10),
            ConnectionManager::new(client),
        )
        .await
        .context("timed out connecting to Redis")?
        .context("failed to connect to Redis")?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await
            .context("Redis PING failed")?;

        info!("Connected to Redis");

        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_count(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.get::<_, Option<i64>>(key)
            .instrument(kv_span("GET"))
            .await
            .map_err(|err| kv_error("GET", err))
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.incr::<_, _, i64>(key, 1)
            .instrument(kv_span("INCR"))
            .await
            .map_err(|err| kv_error("INCR", err))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        conn.expire::<_, ()>(key, seconds)
            .instrument(kv_span("EXPIRE"))
            .await
            .map_err(|err| kv_error("EXPIRE", err))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.sadd::<_, _, ()>(key, member)
            .instrument(kv_span("SADD"))
            .await
            .map_err(|err| kv_error("SADD", err))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.srem::<_, _, ()>(key, member)
            .instrument(kv_span("SREM"))
            .await
            .map_err(|err| kv_error("SREM", err))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.sismember::<_, _, bool>(key, member)
            .instrument(kv_span("SISMEMBER"))
            .await
            .map_err(|err| kv_error("SISMEMBER", err))
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.scard::<_, usize>(key)
            .instrument(kv_span("SCARD"))
            .await
            .map_err(|err| kv_error("SCARD", err))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.del::<_, ()>(key)
            .instrument(kv_span("DEL"))
            .await
            .map_err(|err| kv_error("DEL", err))
    }
}
