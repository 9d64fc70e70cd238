use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AuthError,
    middleware_layer::config::SessionConfig,
    middleware_layer::cookies::removal_cookie,
    models::session::{SessionView, id_prefix},
    state::AppState,
};

/// The header carrying the request's correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// State for one mounting of [`require_session`]: the shared application
/// state plus the route's own configuration.
#[derive(Clone)]
pub struct SessionGuard {
    state: AppState,
    config: Arc<SessionConfig>,
}

impl SessionGuard {
    /// Creates a guard enforcing `config`.
    pub fn new(state: AppState, config: SessionConfig) -> Self {
        Self {
            state,
            config: Arc::new(config),
        }
    }
}

/// A refused request, with whatever was learned about the caller.
struct Rejection {
    kind: AuthError,
    user_id: Option<Uuid>,
}

impl From<AuthError> for Rejection {
    fn from(kind: AuthError) -> Self {
        Self {
            kind,
            user_id: None,
        }
    }
}

/// Reads the correlation id from the request, or makes one up.
fn correlation_id(request: &Request<Body>) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// A middleware that admits only requests carrying a live, authorized session.
///
/// On success the request gets a [`SessionView`] extension. On failure the
/// client gets a bare 401 or 403; the reason is logged with the path and
/// correlation id.
pub async fn require_session(
    State(guard): State<SessionGuard>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if guard.config.is_skipped(&path) {
        tracing::debug!("⏭️ Session check skipped for {}", path);
        return next.run(request).await;
    }

    let correlation_id = correlation_id(&request);
    tracing::debug!("🔐 Checking session for {} ({})", path, correlation_id);

    let mut response = match authenticate(&guard, &cookies).await {
        Ok(view) => {
            tracing::debug!("✅ Session admitted for user {}", view.user_id());
            request.extensions_mut().insert(view);
            next.run(request).await
        }
        Err(Rejection { kind, user_id }) => {
            let user = user_id.map(|id| id.to_string()).unwrap_or_default();
            match kind {
                AuthError::StoreUnavailable | AuthError::ProviderUnavailable => tracing::error!(
                    kind = ?kind,
                    path = %path,
                    correlation_id = %correlation_id,
                    user_id = %user,
                    "❌ Request refused, backend unavailable"
                ),
                _ => tracing::warn!(
                    kind = ?kind,
                    path = %path,
                    correlation_id = %correlation_id,
                    user_id = %user,
                    "❌ Request refused"
                ),
            }

            if kind.clears_cookie() {
                cookies.remove(removal_cookie(guard.config.cookie_name()));
            }
            kind.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn authenticate(guard: &SessionGuard, cookies: &Cookies) -> Result<SessionView, Rejection> {
    let state = &guard.state;
    let config = &guard.config;

    let cookie = cookies
        .get(config.cookie_name())
        .ok_or(AuthError::MissingToken)?;

    let session_id = state.codec.verify(cookie.value())?.to_string();

    let record = state.sessions.get(&session_id).await?;
    let user_id = Some(record.user_id);
    let reject = |kind: AuthError| Rejection { kind, user_id };

    if record.is_expired_at(state.clock.now()) {
        if let Err(e) = state.sessions.revoke_for_user(record.user_id, &session_id).await {
            tracing::debug!("Cleanup of expired session {} failed: {}", id_prefix(&session_id), e);
        }
        return Err(reject(AuthError::SessionNotFound));
    }

    state.sessions.spawn_touch(&session_id, config.touch_timeout);

    let access = state
        .role_cache
        .resolve(record.user_id, state.roles.as_ref(), config.role_cache_ttl)
        .await
        .map_err(reject)?;

    state
        .version_guard
        .check(record.auth_version, access.auth_version)
        .map_err(reject)?;

    let view = SessionView::new(&record, access.roles, access.permissions, access.auth_version);
    authorize(config, &view).map_err(reject)?;

    Ok(view)
}

/// Decides whether `view` satisfies the route's requirements.
///
/// The subject needs at least one of the required roles (if any are set),
/// every required permission, and the policy's approval (if one is set).
pub fn authorize(config: &SessionConfig, view: &SessionView) -> Result<(), AuthError> {
    let roles = config.required_roles();
    if !roles.is_empty() && !roles.iter().any(|role| view.has_role(role)) {
        return Err(AuthError::InsufficientRole);
    }

    if !config
        .required_permissions()
        .iter()
        .all(|permission| view.has_permission(permission))
    {
        return Err(AuthError::InsufficientPermission);
    }

    if let Some(policy) = &config.policy {
        if !policy(view) {
            return Err(AuthError::PolicyDenied);
        }
    }

    Ok(())
}
