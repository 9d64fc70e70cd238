use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::kv::StoreError;

/// Why a request was refused by the session middleware.
///
/// Clients only ever see one of two shapes (401 or 403); the kind itself is
/// logged server-side.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No session cookie on the request.
    #[error("missing session token")]
    MissingToken,

    /// The cookie value is not a well-formed signed token.
    #[error("malformed session token")]
    MalformedToken,

    /// The token's tag does not match its identifier.
    #[error("invalid token signature")]
    InvalidSignature,

    /// No live session under the token's identifier (expired or revoked).
    #[error("session not found")]
    SessionNotFound,

    /// The user's roles changed after the session was issued.
    #[error("authorization version is stale")]
    AuthVersionStale,

    /// The subject holds none of the required roles.
    #[error("insufficient role")]
    InsufficientRole,

    /// The subject lacks at least one required permission.
    #[error("insufficient permission")]
    InsufficientPermission,

    /// A custom route policy refused the subject.
    #[error("denied by policy")]
    PolicyDenied,

    /// The session store or role cache could not be reached.
    #[error("session store unavailable")]
    StoreUnavailable,

    /// The role/permission authority could not be reached.
    #[error("role provider unavailable")]
    ProviderUnavailable,
}

impl AuthError {
    /// The status code the client receives for this kind.
    pub fn status(self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::SessionNotFound
            | AuthError::AuthVersionStale
            | AuthError::StoreUnavailable => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientRole
            | AuthError::InsufficientPermission
            | AuthError::PolicyDenied
            | AuthError::ProviderUnavailable => StatusCode::FORBIDDEN,
        }
    }

    /// Whether the client should be told to drop its session cookie.
    pub fn clears_cookie(self) -> bool {
        matches!(self, AuthError::MalformedToken | AuthError::InvalidSignature)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::FORBIDDEN {
            "Forbidden"
        } else {
            "Unauthorized"
        };
        json_error(status, message)
    }
}

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A session store or cache error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A database pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

fn json_error(status: StatusCode, message: &str) -> Response {
    let body = sonic_rs::to_string(&sonic_rs::json!({
        "error": message
    }))
    .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

    (
        status,
        [(http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Store(ref e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }

            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        json_error(status, &message)
    }
}
