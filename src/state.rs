use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crypto::token::TokenCodec;
use crate::error::Result;
use crate::kv::KvStore;
use crate::kv::memory::MemoryStore;
use crate::kv::redis_store::RedisStore;
use crate::middleware_layer::config::SessionConfig;
use crate::repositories::session::SessionStore;
use crate::repositories::user::PgUserRepository;
use crate::services::auth_version::AuthVersionGuard;
use crate::services::providers::{CredentialVerifier, RolePermissionProvider};
use crate::services::role_cache::RoleCache;
use crate::services::session_limit::ConcurrentSessionLimiter;

/// The application's state.
///
/// Every dependency is injected here; nothing lives in a process-wide
/// singleton, so independent instances never share session or cache state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Signs and verifies session tokens.
    pub codec: TokenCodec,
    /// Session records and per-user indexes.
    pub sessions: SessionStore,
    /// Cached role resolutions.
    pub role_cache: RoleCache,
    /// Enforces the concurrent-session cap at login.
    pub limiter: ConcurrentSessionLimiter,
    /// Detects sessions issued under stale privileges.
    pub version_guard: AuthVersionGuard,
    /// Checks login credentials.
    pub credentials: Arc<dyn CredentialVerifier>,
    /// Authoritative roles and permissions.
    pub roles: Arc<dyn RolePermissionProvider>,
    /// The time source.
    pub clock: Arc<dyn Clock>,
    /// The base middleware configuration routes derive from.
    pub session_config: Arc<SessionConfig>,
}

impl AppState {
    /// Creates a new `AppState` connected to PostgreSQL and, if configured,
    /// Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let db = crate::db::create_pool(&config.database_url, config.database_pool_size)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");
        let users = Arc::new(PgUserRepository::new(db));

        let kv: Arc<dyn KvStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url, config.store_timeout).await?),
            None => {
                tracing::warn!("⚠️ REDIS_URL not set, sessions are kept in process memory");
                Arc::new(MemoryStore::new(clock.clone()))
            }
        };

        Ok(Self::with_backends(config, kv, users.clone(), users, clock))
    }

    /// Assembles an `AppState` from explicit backends.
    pub fn with_backends(
        config: &Config,
        kv: Arc<dyn KvStore>,
        credentials: Arc<dyn CredentialVerifier>,
        roles: Arc<dyn RolePermissionProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = SessionStore::new(
            kv.clone(),
            config.key_prefix.clone(),
            config.session_duration,
            clock.clone(),
        );
        let role_cache = RoleCache::new(kv, config.key_prefix.clone(), clock.clone());

        AppState {
            config: Arc::new(config.clone()),
            codec: TokenCodec::new(&config.session_secret),
            limiter: ConcurrentSessionLimiter::new(sessions.clone()),
            sessions,
            role_cache,
            version_guard: AuthVersionGuard,
            credentials,
            roles,
            clock,
            session_config: Arc::new(SessionConfig::from_config(config)),
        }
    }
}
