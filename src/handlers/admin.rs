use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::Result, models::session::SessionView, state::AppState};

/// The response payload for admin actions against a user.
#[derive(Serialize)]
pub struct AdminResponse {
    pub success: bool,
    pub user_id: String,
    pub revoked_sessions: usize,
}

/// Revokes every session of `user_id`.
pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    Extension(admin): Extension<SessionView>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let revoked = state.sessions.revoke_all(user_id).await?;
    tracing::info!(
        "🛑 Admin {} revoked {} sessions of user {}",
        admin.user_id(),
        revoked,
        user_id
    );

    Ok(Json(AdminResponse {
        success: true,
        user_id: user_id.to_string(),
        revoked_sessions: revoked,
    }))
}

/// Drops the cached role resolution of `user_id`, forcing the next request
/// to consult the authority.
pub async fn invalidate_user_roles(
    State(state): State<AppState>,
    Extension(admin): Extension<SessionView>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.role_cache.invalidate(user_id).await?;
    tracing::info!("🧹 Admin {} invalidated roles of user {}", admin.user_id(), user_id);

    Ok(Json(AdminResponse {
        success: true,
        user_id: user_id.to_string(),
        revoked_sessions: 0,
    }))
}
