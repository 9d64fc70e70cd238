use axum::{
    Extension, Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_cookies::Cookies;

use crate::{
    error::Result,
    middleware_layer::cookies::{is_secure_transport, removal_cookie, session_cookie},
    models::session::{SessionSummary, SessionView, id_prefix},
    state::AppState,
    validation::auth::*,
};

/// The request payload for user login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for a successful login.
#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user_id: String,
    pub username: String,
    /// Older sessions revoked to stay under the concurrent-session cap.
    pub revoked_sessions: usize,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match sonic_rs::to_string(body) {
        Ok(json) => (status, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(e) => {
            tracing::error!("❌ Response serialization failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn ok(message: &str) -> Response {
    json_response(
        StatusCode::OK,
        &AuthResponse {
            success: true,
            message: message.to_string(),
        },
    )
}

/// Handles user login.
///
/// Verifies the credentials, stores a new session, enforces the
/// concurrent-session cap and sets the signed session cookie.
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for: {}", payload.username);
    validate_username(&payload.username)?;

    let user = state
        .credentials
        .verify_credentials(&payload.username, &payload.password)
        .await?;

    let session_id = state.codec.generate()?;
    let ip_address = connect_info.map(|Extension(ConnectInfo(addr))| addr.ip().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let record = state
        .sessions
        .new_record(session_id, &user, ip_address, user_agent);
    let session_id = state.sessions.create(&record).await?;
    tracing::info!("✅ Session {} saved for user {}", id_prefix(&session_id), user.id);

    // The session just captured the current auth_version; a cached entry
    // from before the login may carry an older one.
    if let Err(e) = state.role_cache.invalidate(user.id).await {
        tracing::warn!("⚠️ Role cache invalidation failed for {}: {}", user.id, e);
    }

    let revoked_sessions = match state
        .limiter
        .limit_concurrent_sessions(user.id, state.config.max_concurrent_sessions)
        .await
    {
        Ok(revoked) => revoked,
        Err(e) => {
            tracing::error!("❌ Session limit enforcement failed for {}: {}", user.id, e);
            if let Err(rollback) = state.sessions.revoke_for_user(user.id, &session_id).await {
                tracing::warn!(
                    "⚠️ Rollback of session {} failed: {}",
                    id_prefix(&session_id),
                    rollback
                );
            }
            return Err(e.into());
        }
    };

    let secure = is_secure_transport(&headers);
    cookies.add(session_cookie(
        &state.config,
        state.codec.sign(&session_id),
        secure,
    ));
    tracing::info!("✅ User logged in: {}", user.id);

    Ok(json_response(
        StatusCode::OK,
        &LoginResponse {
            success: true,
            user_id: user.id.to_string(),
            username: user.username,
            revoked_sessions,
        },
    ))
}

/// Handles user logout: revokes the current session only.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionView>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", session.user_id());

    state
        .sessions
        .revoke_for_user(session.user_id(), session.session_id())
        .await?;
    cookies.remove(removal_cookie(&state.config.session_cookie_name));

    tracing::info!("✅ Session {} revoked", id_prefix(session.session_id()));
    Ok(ok("Logout successful"))
}

/// Handles logging out everywhere: revokes every session of the user.
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(session): Extension<SessionView>,
    cookies: Cookies,
) -> Result<Response> {
    let revoked = state.sessions.revoke_all(session.user_id()).await?;
    cookies.remove(removal_cookie(&state.config.session_cookie_name));

    tracing::info!("✅ {} sessions revoked for user {}", revoked, session.user_id());
    Ok(ok("Logged out of all sessions"))
}

/// Handles changing a user's password.
///
/// The current password is checked first, then every session of the user
/// is revoked, and only then is the new hash written. A store failure
/// while revoking leaves the old password in place. The hash update also
/// bumps the user's auth_version so a session created in between goes stale.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(session): Extension<SessionView>,
    cookies: Cookies,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response> {
    tracing::info!("🔑 Change password for user: {}", session.user_id());

    validate_password(&payload.new_password)?;

    state
        .credentials
        .verify_credentials(session.username(), &payload.current_password)
        .await?;

    let revoked = state.sessions.revoke_all(session.user_id()).await?;

    state
        .credentials
        .change_password(
            session.user_id(),
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    if let Err(e) = state.role_cache.invalidate(session.user_id()).await {
        tracing::warn!("⚠️ Role cache invalidation failed for {}: {}", session.user_id(), e);
    }
    cookies.remove(removal_cookie(&state.config.session_cookie_name));

    tracing::info!(
        "✅ Password changed for user {}, {} sessions revoked",
        session.user_id(),
        revoked
    );
    Ok(ok("Password changed successfully"))
}

/// Lists the caller's active sessions, oldest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(session): Extension<SessionView>,
) -> Result<Response> {
    let sessions: Vec<SessionSummary> = state
        .sessions
        .active_sessions(session.user_id())
        .await?
        .iter()
        .map(|record| SessionSummary::of(record, session.session_id()))
        .collect();

    Ok(json_response(StatusCode::OK, &sessions))
}

/// Returns the authenticated subject.
pub async fn me(Extension(session): Extension<SessionView>) -> Response {
    json_response(StatusCode::OK, &session)
}
