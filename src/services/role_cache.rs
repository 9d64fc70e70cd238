use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::kv::{KvStore, StoreError, StoreResult};
use crate::models::user::UserAccess;
use crate::services::providers::RolePermissionProvider;

/// A cached copy of a user's roles, permissions and authorization version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleCacheEntry {
    /// The user the entry belongs to.
    pub user_id: Uuid,
    /// Role names. May legitimately be empty.
    pub roles: BTreeSet<String>,
    /// Permission names. May legitimately be empty.
    pub permissions: BTreeSet<String>,
    /// The authorization version at caching time.
    pub auth_version: i64,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl RoleCacheEntry {
    /// The cached access, detached from its bookkeeping fields.
    pub fn access(&self) -> UserAccess {
        UserAccess {
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
            auth_version: self.auth_version,
        }
    }
}

/// Outcome of a cache read.
///
/// A hit with empty sets is still a hit: the user is known to hold nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleLookup {
    Hit(RoleCacheEntry),
    Miss,
}

/// Short-lived cache of role resolutions, stored as JSON in the backing store
/// under `role_cache:{user_id}`.
#[derive(Clone)]
pub struct RoleCache {
    kv: Arc<dyn KvStore>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl RoleCache {
    /// Creates a new `RoleCache`.
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            clock,
        }
    }

    fn key(&self, user_id: Uuid) -> String {
        format!("{}role_cache:{}", self.prefix, user_id)
    }

    /// Reads the cached entry for `user_id`.
    ///
    /// An undecodable entry is dropped and reported as a miss.
    pub async fn lookup(&self, user_id: Uuid) -> StoreResult<RoleLookup> {
        let key = self.key(user_id);
        let Some(json) = self.kv.get(&key).await? else {
            return Ok(RoleLookup::Miss);
        };

        match sonic_rs::from_str::<RoleCacheEntry>(&json) {
            Ok(entry) => Ok(RoleLookup::Hit(entry)),
            Err(e) => {
                tracing::warn!("⚠️ Discarding unreadable role cache entry for {}: {}", user_id, e);
                self.kv.del(&key).await?;
                Ok(RoleLookup::Miss)
            }
        }
    }

    /// Caches `access` for `user_id`, replacing any existing entry.
    pub async fn store(&self, user_id: Uuid, access: &UserAccess, ttl: Duration) -> StoreResult<()> {
        let entry = RoleCacheEntry {
            user_id,
            roles: access.roles.clone(),
            permissions: access.permissions.clone(),
            auth_version: access.auth_version,
            cached_at: self.clock.now(),
        };
        let json = sonic_rs::to_string(&entry).map_err(|e| StoreError::Corrupt {
            key: self.key(user_id),
            reason: e.to_string(),
        })?;
        self.kv.set_ex(&self.key(user_id), &json, ttl).await
    }

    /// Drops the cached entry for `user_id`.
    ///
    /// Call whenever the user's roles or permissions change out-of-band.
    pub async fn invalidate(&self, user_id: Uuid) -> StoreResult<()> {
        self.kv.del(&self.key(user_id)).await?;
        tracing::debug!("🧹 Role cache invalidated for user {}", user_id);
        Ok(())
    }

    /// Returns the user's access from the cache, or from `provider` on a miss,
    /// populating the cache before returning.
    ///
    /// # Errors
    ///
    /// [`AuthError::StoreUnavailable`] if the cache cannot be read or written,
    /// [`AuthError::ProviderUnavailable`] if the provider fails.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        provider: &dyn RolePermissionProvider,
        ttl: Duration,
    ) -> Result<UserAccess, AuthError> {
        match self.lookup(user_id).await {
            Ok(RoleLookup::Hit(entry)) => return Ok(entry.access()),
            Ok(RoleLookup::Miss) => {}
            Err(e) => {
                tracing::error!("❌ Role cache read failed for {}: {}", user_id, e);
                return Err(AuthError::StoreUnavailable);
            }
        }

        let access = provider
            .get_user_roles_and_permissions(user_id)
            .await
            .map_err(|e| {
                tracing::error!("❌ Role provider failed for {}: {}", user_id, e);
                AuthError::ProviderUnavailable
            })?;

        self.store(user_id, &access, ttl).await.map_err(|e| {
            tracing::error!("❌ Role cache write failed for {}: {}", user_id, e);
            AuthError::StoreUnavailable
        })?;

        Ok(access)
    }
}
