use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};
use tower_cookies::cookie::SameSite;
use zeroize::{Zeroize, Zeroizing};

/// The minimum length of the session signing secret in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The maximum number of pooled database connections.
    pub database_pool_size: usize,
    /// The URL of the Redis server. `None` selects the in-memory store.
    pub redis_url: Option<String>,
    /// The address the server binds to.
    pub bind_addr: SocketAddr,
    /// The key used to sign session tokens.
    pub session_secret: Zeroizing<Vec<u8>>,
    /// How long a session lives after login.
    pub session_duration: Duration,
    /// The maximum number of concurrent sessions per user (0 = unlimited).
    pub max_concurrent_sessions: usize,
    /// How long a role resolution stays cached.
    pub role_cache_ttl: Duration,
    /// Deadline for the background activity touch.
    pub touch_timeout: Duration,
    /// Deadline for each backing-store command.
    pub store_timeout: Duration,
    /// Namespace prepended to every backing-store key.
    pub key_prefix: String,
    /// The name of the session cookie.
    pub session_cookie_name: String,
    /// The SameSite attribute of the session cookie.
    pub cookie_same_site: SameSite,
    /// Always mark cookies Secure, whatever the request scheme.
    pub force_secure_cookies: bool,
    /// Paths that bypass the session middleware entirely.
    pub skip_paths: Vec<String>,
}

impl Config {
    /// Creates a `Config` with default settings around `session_secret`.
    pub fn new(session_secret: Vec<u8>) -> Self {
        Self {
            database_url: String::new(),
            database_pool_size: 16,
            redis_url: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            session_secret: Zeroizing::new(session_secret),
            session_duration: Duration::from_secs(7 * 24 * 3600),
            max_concurrent_sessions: 5,
            role_cache_ttl: Duration::from_secs(300),
            touch_timeout: Duration::from_millis(2000),
            store_timeout: Duration::from_millis(1000),
            key_prefix: "sentinel:".to_string(),
            session_cookie_name: "session".to_string(),
            cookie_same_site: SameSite::Lax,
            force_secure_cookies: false,
            skip_paths: Vec::new(),
        }
    }

    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut secret_hex = env::var("SESSION_SECRET")
            .context("SESSION_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let secret = hex::decode(&secret_hex).context("SESSION_SECRET must be valid hexadecimal")?;

        secret_hex.zeroize();

        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("SESSION_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }

        let defaults = Self::new(secret);

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_pool_size: parse_or("DATABASE_POOL_SIZE", defaults.database_pool_size)?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            bind_addr: parse_or("BIND_ADDR", defaults.bind_addr)?,
            session_duration: Duration::from_secs(
                parse_or::<u64>("SESSION_DURATION_HOURS", 168)? * 3600,
            ),
            max_concurrent_sessions: parse_or(
                "MAX_CONCURRENT_SESSIONS",
                defaults.max_concurrent_sessions,
            )?,
            role_cache_ttl: Duration::from_secs(parse_or("ROLE_CACHE_TTL_SECS", 300)?),
            touch_timeout: Duration::from_millis(parse_or("TOUCH_TIMEOUT_MS", 2000)?),
            store_timeout: Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 1000)?),
            key_prefix: env::var("KEY_PREFIX").unwrap_or(defaults.key_prefix.clone()),
            session_cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or(defaults.session_cookie_name.clone()),
            cookie_same_site: match env::var("COOKIE_SAME_SITE") {
                Ok(value) => parse_same_site(&value)?,
                Err(_) => defaults.cookie_same_site,
            },
            force_secure_cookies: env::var("APP_ENV")
                .map(|e| e == "production")
                .unwrap_or(false),
            skip_paths: env::var("SKIP_PATHS")
                .map(|paths| {
                    paths
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            ..defaults
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

fn parse_same_site(value: &str) -> Result<SameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        other => anyhow::bail!("Invalid COOKIE_SAME_SITE: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_site_parsing() {
        assert_eq!(parse_same_site("Strict").unwrap(), SameSite::Strict);
        assert_eq!(parse_same_site(" none ").unwrap(), SameSite::None);
        assert!(parse_same_site("sideways").is_err());
    }
}
