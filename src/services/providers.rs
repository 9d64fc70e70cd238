//! Contracts for the collaborators the session core relies on but does not own.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::user::{UserAccess, VerifiedUser};

/// The authoritative source of a user's roles and permissions.
///
/// Consulted only when the role cache misses.
#[async_trait]
pub trait RolePermissionProvider: Send + Sync {
    /// Resolves the current roles, permissions and authorization version.
    async fn get_user_roles_and_permissions(&self, user_id: Uuid) -> Result<UserAccess>;
}

/// Checks login credentials and manages the stored password.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verifies `password` for the account named `username`.
    ///
    /// # Errors
    ///
    /// `AppError::Authentication` for an unknown account or a wrong password;
    /// the two are indistinguishable to the caller.
    async fn verify_credentials(&self, username: &str, password: &str) -> Result<VerifiedUser>;

    /// Replaces the password of `user_id` after checking `current_password`.
    ///
    /// The same write bumps the user's auth_version.
    async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<()>;
}
