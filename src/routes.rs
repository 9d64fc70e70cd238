use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};
use tracing::Level;

use crate::{
    handlers,
    middleware_layer::{
        auth::{SessionGuard, require_session},
        config::require_role,
    },
    state::AppState,
};

/// Path of the liveness probe. It sits behind the session middleware but is
/// always on the skip list.
pub const HEALTH_PATH: &str = "/health";

async fn health() -> &'static str {
    "ok"
}

/// Builds the application router.
///
/// Login is public. Every other route runs through the session middleware,
/// the admin routes with a configuration derived to require the `admin` role.
pub fn build_router(state: AppState) -> Router {
    let base = state.session_config.as_ref().clone().with_skip_path(HEALTH_PATH);
    let admin = require_role(&base, "admin");

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(HEALTH_PATH, get(health))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/logout-all", post(handlers::auth::logout_all))
        .route(
            "/api/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route("/api/auth/sessions", get(handlers::auth::list_sessions))
        .route("/api/auth/me", get(handlers::auth::me))
        .route_layer(from_fn_with_state(
            SessionGuard::new(state.clone(), base),
            require_session,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/api/admin/users/{user_id}/sessions/revoke",
            post(handlers::admin::revoke_user_sessions),
        )
        .route(
            "/api/admin/users/{user_id}/roles/invalidate",
            post(handlers::admin::invalidate_user_roles),
        )
        .route_layer(from_fn_with_state(
            SessionGuard::new(state.clone(), admin),
            require_session,
        ))
        .with_state(state);

    Router::new()
        .merge(login_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
}
