use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{KvStore, StoreError, StoreResult};
use crate::clock::Clock;

enum Value {
    Text(String),
    Counter(i64),
    Scored(Vec<(String, f64)>),
}

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// An in-process [`KvStore`] with TTL semantics driven by a [`Clock`].
///
/// Expired entries are dropped lazily on access. Scored sets keep members
/// with equal scores in insertion order.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn deadline(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(ttl)
            .ok()
            .map(|ttl| self.clock.now() + ttl)
    }

    fn purge_if_expired(&self, entries: &mut HashMap<String, Entry>, key: &str) {
        let now = self.clock.now();
        let expired = entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            entries.remove(key);
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: "operation against a key holding the wrong kind of value".to_string(),
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let expires_at = self.deadline(ttl);
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_existing(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.value = Value::Text(value.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(Entry {
                value: Value::Counter(n),
                ..
            }) => Ok(Some(n.to_string())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let expires_at = self.deadline(ttl);
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = expires_at;
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                Ok(*n)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Scored(Vec::new()),
            expires_at: None,
        });
        let Value::Scored(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        members.retain(|(m, _)| m != member);
        // Insert after every member with a lower or equal score.
        let at = members.partition_point(|(_, s)| *s <= score);
        members.insert(at, (member.to_string(), score));
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        if let Some(Entry {
            value: Value::Scored(members),
            ..
        }) = entries.get_mut(key)
        {
            members.retain(|(m, _)| m != member);
            if members.is_empty() {
                entries.remove(key);
            }
        }
        Ok(())
    }

    async fn zrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.write().await;
        self.purge_if_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Scored(members),
                ..
            }) => Ok(members.iter().map(|(m, _)| m.clone()).collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }
}
