use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, aio::ConnectionManager};
use std::future::Future;
use std::time::Duration;

use super::{KvStore, StoreError, StoreResult};

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// A [`KvStore`] backed by Redis through a pooled connection manager.
///
/// Every command runs under `op_timeout`; a stalled server surfaces as
/// [`StoreError::Timeout`] instead of hanging the request.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connects to the Redis server at `url`.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL of the Redis server.
    /// * `op_timeout` - Deadline applied to every command.
    ///
    /// # Returns
    ///
    /// A `StoreResult` containing the `RedisStore`.
    pub async fn connect(url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)))
            .await
    }

    async fn set_existing(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .bounded(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("XX")
                    .arg("KEEPTTL")
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(conn.get::<_, Option<String>>(key)).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(conn.del::<_, ()>(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(conn.expire::<_, ()>(key, ttl_secs(ttl) as i64))
            .await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        self.bounded(conn.incr::<_, _, i64>(key, 1)).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(conn.zadd::<_, _, _, ()>(key, member, score))
            .await
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(conn.zrem::<_, _, ()>(key, member)).await
    }

    async fn zrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded(conn.zrange::<_, Vec<String>>(key, 0, -1)).await
    }
}
