use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::session::SessionView;

/// A route-level admission check evaluated over the resolved session.
pub type Policy = Arc<dyn Fn(&SessionView) -> bool + Send + Sync>;

/// Settings for one mounting of the session middleware.
///
/// Build a base once from [`Config`] and derive per-route variants with
/// [`require_role`], [`require_permission`] and friends. Every derivation
/// takes the base by shared reference and returns an independent copy, so
/// the base is never mutated, however many routes derive from it at once.
#[derive(Clone)]
pub struct SessionConfig {
    pub(crate) cookie_name: String,
    pub(crate) skip_paths: Vec<String>,
    pub(crate) required_roles: Vec<String>,
    pub(crate) required_permissions: Vec<String>,
    pub(crate) policy: Option<Policy>,
    pub(crate) role_cache_ttl: Duration,
    pub(crate) touch_timeout: Duration,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("skip_paths", &self.skip_paths)
            .field("required_roles", &self.required_roles)
            .field("required_permissions", &self.required_permissions)
            .field("policy", &self.policy.as_ref().map(|_| "<fn>"))
            .field("role_cache_ttl", &self.role_cache_ttl)
            .field("touch_timeout", &self.touch_timeout)
            .finish()
    }
}

impl SessionConfig {
    /// The base configuration: any authenticated session is admitted.
    pub fn from_config(config: &Config) -> Self {
        Self {
            cookie_name: config.session_cookie_name.clone(),
            skip_paths: config.skip_paths.clone(),
            required_roles: Vec::new(),
            required_permissions: Vec::new(),
            policy: None,
            role_cache_ttl: config.role_cache_ttl,
            touch_timeout: config.touch_timeout,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn skip_paths(&self) -> &[String] {
        &self.skip_paths
    }

    pub fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    pub fn required_permissions(&self) -> &[String] {
        &self.required_permissions
    }

    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    /// Whether requests to `path` bypass the middleware.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| p == path)
    }

    /// Adds a role to the set of which the subject needs at least one.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        push_unique(&mut self.required_roles, role.into());
        self
    }

    /// Adds a permission the subject must hold.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        push_unique(&mut self.required_permissions, permission.into());
        self
    }

    /// Adds a path that bypasses the middleware.
    #[must_use]
    pub fn with_skip_path(mut self, path: impl Into<String>) -> Self {
        push_unique(&mut self.skip_paths, path.into());
        self
    }

    /// Sets the custom policy. A previous policy, if any, must also pass.
    #[must_use]
    pub fn with_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&SessionView) -> bool + Send + Sync + 'static,
    {
        let combined: Policy = match self.policy.take() {
            Some(previous) => Arc::new(move |view: &SessionView| previous(view) && policy(view)),
            None => Arc::new(policy),
        };
        self.policy = Some(combined);
        self
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Derives a configuration that additionally requires `role`.
pub fn require_role(base: &SessionConfig, role: &str) -> SessionConfig {
    base.clone().with_role(role)
}

/// Derives a configuration that requires at least one of `roles`.
pub fn require_any_role(base: &SessionConfig, roles: &[&str]) -> SessionConfig {
    roles
        .iter()
        .fold(base.clone(), |config, role| config.with_role(*role))
}

/// Derives a configuration that additionally requires `permission`.
pub fn require_permission(base: &SessionConfig, permission: &str) -> SessionConfig {
    base.clone().with_permission(permission)
}

/// Derives a configuration that requires every one of `permissions`.
pub fn require_permissions(base: &SessionConfig, permissions: &[&str]) -> SessionConfig {
    permissions
        .iter()
        .fold(base.clone(), |config, permission| config.with_permission(*permission))
}

/// Derives a configuration guarded by an extra policy predicate.
pub fn require_policy<F>(base: &SessionConfig, policy: F) -> SessionConfig
where
    F: Fn(&SessionView) -> bool + Send + Sync + 'static,
{
    base.clone().with_policy(policy)
}
