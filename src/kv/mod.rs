//! Backing key/value store used for sessions and the role cache.
//!
//! The trait is small: string values with a TTL, plus one
//! scored set per key for the per-user session index. Callers namespace
//! their own keys.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis_store;

/// Errors raised by a [`KvStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached or refused the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the configured deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value could not be decoded.
    #[error("corrupt value under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// A `Result` type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key/value persistence with TTLs and ordered per-key member sets.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Writes `value` under `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Overwrites `key` only if it still exists, keeping its remaining TTL.
    ///
    /// Returns `false` when the key was absent and nothing was written.
    async fn set_existing(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Reads `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Resets the TTL of `key`.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically increments the counter under `key`, returning the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Adds `member` to the scored set under `key`.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Removes `member` from the scored set under `key`.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Lists the members of the scored set under `key`, lowest score first.
    async fn zrange(&self, key: &str) -> StoreResult<Vec<String>>;
}
