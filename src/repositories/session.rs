use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::kv::{KvStore, StoreError, StoreResult};
use crate::models::session::{SessionRecord, id_prefix};
use crate::models::user::VerifiedUser;

/// Scores in the per-user index are `created_at_ms * SEQ_SLOTS + seq % SEQ_SLOTS`,
/// so sessions created in the same millisecond keep their insertion order.
const SEQ_SLOTS: i64 = 1000;

/// Persists session records and the per-user index of live session ids.
///
/// Key layout under the configured prefix:
/// - `session:{id}` → JSON [`SessionRecord`], TTL = session duration
/// - `user_sessions:{user_id}` → scored set of session ids, oldest first
/// - `user_session_seq:{user_id}` → insertion counter for tie-breaking
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Creates a new `SessionStore`.
    ///
    /// # Arguments
    ///
    /// * `kv` - The backing store.
    /// * `prefix` - Namespace prepended to every key.
    /// * `ttl` - How long a session lives after creation.
    /// * `clock` - Time source for timestamps and expiry checks.
    pub fn new(
        kv: Arc<dyn KvStore>,
        prefix: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            ttl,
            clock,
        }
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}session:{}", self.prefix, session_id)
    }

    fn index_key(&self, user_id: Uuid) -> String {
        format!("{}user_sessions:{}", self.prefix, user_id)
    }

    fn seq_key(&self, user_id: Uuid) -> String {
        format!("{}user_session_seq:{}", self.prefix, user_id)
    }

    /// Builds a fresh record for `user`, expiring one TTL from now.
    pub fn new_record(
        &self,
        session_id: String,
        user: &VerifiedUser,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> SessionRecord {
        let now = self.clock.now();
        SessionRecord {
            session_id,
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            auth_version: user.auth_version,
            created_at: now,
            last_activity_at: now,
            expires_at: now + chrono::Duration::seconds(self.ttl.as_secs() as i64),
            ip_address,
            user_agent,
        }
    }

    /// Stores `record` and adds it to its user's index.
    ///
    /// The record is written before the index entry, so an indexed id always
    /// had a record. If indexing fails the record is removed again.
    ///
    /// # Returns
    ///
    /// The session identifier.
    pub async fn create(&self, record: &SessionRecord) -> StoreResult<String> {
        let json = sonic_rs::to_string(record).map_err(|e| StoreError::Corrupt {
            key: self.session_key(id_prefix(&record.session_id)),
            reason: e.to_string(),
        })?;

        self.kv
            .set_ex(&self.session_key(&record.session_id), &json, self.ttl)
            .await?;

        if let Err(e) = self.index(record).await {
            tracing::error!(
                "❌ Indexing session {} failed, rolling back: {}",
                id_prefix(&record.session_id),
                e
            );
            if let Err(rollback) = self.kv.del(&self.session_key(&record.session_id)).await {
                tracing::warn!(
                    "⚠️ Rollback of session {} failed, record left to expire: {}",
                    id_prefix(&record.session_id),
                    rollback
                );
            }
            return Err(e);
        }

        tracing::debug!(
            "✅ Session {} created for user {}",
            id_prefix(&record.session_id),
            record.user_id
        );
        Ok(record.session_id.clone())
    }

    async fn index(&self, record: &SessionRecord) -> StoreResult<()> {
        let seq_key = self.seq_key(record.user_id);
        let seq = self.kv.incr(&seq_key).await?;
        self.kv.expire(&seq_key, self.ttl).await?;

        let score = record.created_at.timestamp_millis() * SEQ_SLOTS + seq.rem_euclid(SEQ_SLOTS);
        let index_key = self.index_key(record.user_id);
        self.kv
            .zadd(&index_key, &record.session_id, score as f64)
            .await?;
        self.kv.expire(&index_key, self.ttl).await
    }

    /// Reads a session record, if one is stored under `session_id`.
    pub async fn find(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let key = self.session_key(session_id);
        let Some(json) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        sonic_rs::from_str::<SessionRecord>(&json)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: self.session_key(id_prefix(session_id)),
                reason: e.to_string(),
            })
    }

    /// Looks up a live session.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionNotFound`] when nothing is stored under the id,
    /// whether it expired or was revoked. [`AuthError::StoreUnavailable`]
    /// when the store cannot answer.
    pub async fn get(&self, session_id: &str) -> Result<SessionRecord, AuthError> {
        match self.find(session_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(AuthError::SessionNotFound),
            Err(StoreError::Corrupt { key, reason }) => {
                tracing::error!("❌ Unreadable session record {}: {}", key, reason);
                Err(AuthError::SessionNotFound)
            }
            Err(e) => {
                tracing::error!("❌ Session lookup failed: {}", e);
                Err(AuthError::StoreUnavailable)
            }
        }
    }

    /// Records activity on a session.
    ///
    /// Only rewrites a record that still exists and keeps its TTL, so a touch
    /// racing a revoke cannot bring the session back.
    pub async fn touch(&self, session_id: &str, timeout: Duration) -> StoreResult<()> {
        let work = async {
            let Some(mut record) = self.find(session_id).await? else {
                return Ok(());
            };
            record.last_activity_at = self.clock.now();
            let json = sonic_rs::to_string(&record).map_err(|e| StoreError::Corrupt {
                key: self.session_key(id_prefix(session_id)),
                reason: e.to_string(),
            })?;
            self.kv
                .set_existing(&self.session_key(session_id), &json)
                .await
                .map(|_| ())
        };

        tokio::time::timeout(timeout, work)
            .await
            .unwrap_or(Err(StoreError::Timeout(timeout)))
    }

    /// Spawns [`touch`](Self::touch) detached from the caller.
    ///
    /// The task has its own deadline and is not cancelled with the request
    /// that triggered it. Failures are logged at debug level and dropped.
    pub fn spawn_touch(&self, session_id: &str, timeout: Duration) {
        let store = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.touch(&session_id, timeout).await {
                tracing::debug!(
                    "Activity touch for session {} skipped: {}",
                    id_prefix(&session_id),
                    e
                );
            }
        });
    }

    /// Deletes a session and drops it from its user's index.
    ///
    /// Revoking an unknown or already revoked session succeeds.
    pub async fn revoke(&self, session_id: &str) -> StoreResult<()> {
        let user_id = match self.find(session_id).await {
            Ok(record) => record.map(|r| r.user_id),
            Err(StoreError::Corrupt { .. }) => None,
            Err(e) => return Err(e),
        };

        match user_id {
            Some(user_id) => self.revoke_for_user(user_id, session_id).await,
            None => self.kv.del(&self.session_key(session_id)).await,
        }
    }

    /// Deletes a session known to belong to `user_id`.
    pub async fn revoke_for_user(&self, user_id: Uuid, session_id: &str) -> StoreResult<()> {
        self.kv.del(&self.session_key(session_id)).await?;
        self.kv.zrem(&self.index_key(user_id), session_id).await?;
        tracing::debug!("🗑️ Session {} revoked", id_prefix(session_id));
        Ok(())
    }

    /// Deletes every session in the user's index.
    ///
    /// # Returns
    ///
    /// How many index entries were removed.
    pub async fn revoke_all(&self, user_id: Uuid) -> StoreResult<usize> {
        let index_key = self.index_key(user_id);
        let ids = self.kv.zrange(&index_key).await?;
        for session_id in &ids {
            self.kv.del(&self.session_key(session_id)).await?;
        }
        self.kv.del(&index_key).await?;
        tracing::info!("🗑️ Revoked {} session(s) for user {}", ids.len(), user_id);
        Ok(ids.len())
    }

    /// Lists the user's live sessions, oldest first.
    ///
    /// Index entries are pruned when their record is missing or unreadable,
    /// and also when the record has outlived its own `expires_at`.
    pub async fn active_sessions(&self, user_id: Uuid) -> StoreResult<Vec<SessionRecord>> {
        let index_key = self.index_key(user_id);
        let now = self.clock.now();
        let mut live = Vec::new();

        for session_id in self.kv.zrange(&index_key).await? {
            match self.find(&session_id).await {
                Ok(Some(record)) if !record.is_expired_at(now) => live.push(record),
                Ok(Some(_)) => {
                    tracing::debug!("Pruning expired session {}", id_prefix(&session_id));
                    self.revoke_for_user(user_id, &session_id).await?;
                }
                Ok(None) | Err(StoreError::Corrupt { .. }) => {
                    tracing::debug!("Pruning stale index entry {}", id_prefix(&session_id));
                    self.kv.zrem(&index_key, &session_id).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;

    fn store(ttl_secs: u64) -> (SessionStore, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let kv = Arc::new(MemoryStore::new(clock_arc.clone()));
        (
            SessionStore::new(kv, "test:", Duration::from_secs(ttl_secs), clock_arc),
            clock,
        )
    }

    fn user() -> VerifiedUser {
        VerifiedUser {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: None,
            auth_version: 1,
        }
    }

    async fn login(store: &SessionStore, user: &VerifiedUser, id: &str) -> SessionRecord {
        let record = store.new_record(id.to_string(), user, None, None);
        store.create(&record).await.unwrap();
        record
    }

    /// Memory store that can refuse index writes or hang on in-place updates.
    struct Faulty {
        inner: MemoryStore,
        refuse_zadd: bool,
        hang_updates: bool,
    }

    #[async_trait]
    impl KvStore for Faulty {
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
            self.inner.set_ex(key, value, ttl).await
        }

        async fn set_existing(&self, key: &str, value: &str) -> StoreResult<bool> {
            if self.hang_updates {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.inner.set_existing(key, value).await
        }

        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn del(&self, key: &str) -> StoreResult<()> {
            self.inner.del(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
            self.inner.expire(key, ttl).await
        }

        async fn incr(&self, key: &str) -> StoreResult<i64> {
            self.inner.incr(key).await
        }

        async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
            if self.refuse_zadd {
                return Err(StoreError::Unavailable("READONLY replica".to_string()));
            }
            self.inner.zadd(key, member, score).await
        }

        async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
            self.inner.zrem(key, member).await
        }

        async fn zrange(&self, key: &str) -> StoreResult<Vec<String>> {
            self.inner.zrange(key).await
        }
    }

    fn faulty_store(refuse_zadd: bool, hang_updates: bool) -> SessionStore {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let kv = Arc::new(Faulty {
            inner: MemoryStore::new(clock.clone()),
            refuse_zadd,
            hang_updates,
        });
        SessionStore::new(kv, "test:", Duration::from_secs(60), clock)
    }

    #[tokio::test]
    async fn created_session_can_be_read_back() {
        let (store, _) = store(60);
        let user = user();
        let record = login(&store, &user, "s1").await;

        assert_eq!(store.get("s1").await.unwrap(), record);
        assert_eq!(store.get("missing").await, Err(AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn expired_and_revoked_sessions_look_the_same() {
        let (store, clock) = store(60);
        let user = user();
        login(&store, &user, "expires").await;
        login(&store, &user, "revoked").await;

        store.revoke("revoked").await.unwrap();
        store.revoke("revoked").await.unwrap();
        clock.advance(chrono::Duration::seconds(60));

        assert_eq!(store.get("expires").await, Err(AuthError::SessionNotFound));
        assert_eq!(store.get("revoked").await, Err(AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn revoke_all_removes_every_session_of_the_user() {
        let (store, _) = store(60);
        let alice = user();
        let bob = user();
        login(&store, &alice, "a1").await;
        login(&store, &alice, "a2").await;
        login(&store, &bob, "b1").await;

        assert_eq!(store.revoke_all(alice.id).await.unwrap(), 2);

        assert_eq!(store.get("a1").await, Err(AuthError::SessionNotFound));
        assert_eq!(store.get("a2").await, Err(AuthError::SessionNotFound));
        assert!(store.get("b1").await.is_ok());
        assert!(store.active_sessions(alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn touch_updates_activity_without_resurrecting() {
        let (store, clock) = store(60);
        let user = user();
        let record = login(&store, &user, "s1").await;

        clock.advance(chrono::Duration::seconds(10));
        store.touch("s1", Duration::from_secs(2)).await.unwrap();
        let touched = store.get("s1").await.unwrap();
        assert_eq!(touched.last_activity_at, record.created_at + chrono::Duration::seconds(10));
        assert_eq!(touched.expires_at, record.expires_at);

        store.revoke("s1").await.unwrap();
        store.touch("s1", Duration::from_secs(2)).await.unwrap();
        assert_eq!(store.get("s1").await, Err(AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn active_sessions_are_ordered_and_pruned() {
        let (store, clock) = store(60);
        let user = user();
        login(&store, &user, "old").await;
        clock.advance(chrono::Duration::seconds(30));
        login(&store, &user, "mid").await;
        login(&store, &user, "new").await;

        let ids: Vec<_> = store
            .active_sessions(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["old", "mid", "new"]);

        clock.advance(chrono::Duration::seconds(30));
        let ids: Vec<_> = store
            .active_sessions(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["mid", "new"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_all_land_in_the_index() {
        let (store, _) = store(60);
        let user = user();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    let record = store.new_record(format!("s{}", i), &user, None, None);
                    store.create(&record).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let indexed = store.kv.zrange(&store.index_key(user.id)).await.unwrap();
        assert_eq!(indexed.len(), 20);
        assert_eq!(store.active_sessions(user.id).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn touch_gives_up_at_its_own_deadline() {
        let store = faulty_store(false, true);
        let user = user();
        login(&store, &user, "s1").await;

        let started = tokio::time::Instant::now();
        let outcome = store.touch("s1", Duration::from_millis(50)).await;

        assert!(matches!(outcome, Err(StoreError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(store.get("s1").await.is_ok());
    }

    #[tokio::test]
    async fn failed_indexing_removes_the_record() {
        let store = faulty_store(true, false);
        let user = user();
        let record = store.new_record("s1".to_string(), &user, None, None);

        assert!(store.create(&record).await.is_err());
        assert_eq!(store.get("s1").await, Err(AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn records_past_their_expiry_are_pruned_when_the_store_lags() {
        // The store's own clock never moves, so its TTLs never fire.
        let store_clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let clock = ManualClock::new(Utc::now());
        let kv = Arc::new(MemoryStore::new(store_clock));
        let store = SessionStore::new(kv, "test:", Duration::from_secs(60), Arc::new(clock.clone()));
        let user = user();
        login(&store, &user, "stale").await;
        clock.advance(chrono::Duration::seconds(61));
        login(&store, &user, "fresh").await;

        let live: Vec<_> = store
            .active_sessions(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(live, vec!["fresh"]);

        let indexed = store.kv.zrange(&store.index_key(user.id)).await.unwrap();
        assert_eq!(indexed, vec!["fresh"]);
        assert_eq!(store.kv.get(&store.session_key("stale")).await.unwrap(), None);
    }
}
