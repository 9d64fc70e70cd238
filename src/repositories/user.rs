use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::{UserAccess, VerifiedUser},
    services::auth as passwords,
    services::providers::{CredentialVerifier, RolePermissionProvider},
};

/// A user row as needed for credential checks.
struct UserRow {
    id: Uuid,
    username: String,
    email: Option<String>,
    password: String,
    auth_version: i64,
}

/// A helper function to map a `tokio_postgres::Row` to a `UserRow`.
fn row_to_user(row: &Row) -> Result<UserRow> {
    let missing = |column: &str| AppError::Internal(format!("users.{} unreadable", column));
    Ok(UserRow {
        id: row.try_get("id").map_err(|_| missing("id"))?,
        username: row.try_get("username").map_err(|_| missing("username"))?,
        email: row.try_get("email").map_err(|_| missing("email"))?,
        password: row.try_get("password").map_err(|_| missing("password"))?,
        auth_version: row.try_get("auth_version").map_err(|_| missing("auth_version"))?,
    })
}

/// Runs an Argon2 verification off the async executor.
async fn verify_blocking(candidate: &str, hash: String) -> Result<bool> {
    let candidate = candidate.to_string();
    tokio::task::spawn_blocking(move || passwords::verify_password(&candidate, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
}

/// Users, roles and permissions stored in PostgreSQL (see `sql/schema.sql`).
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    /// Creates a new `PgUserRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Finds an active user by their username.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, username, email, password, auth_version
                FROM users
                WHERE username = $1 AND is_active = true
                "#,
                &[&username],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Finds a user by their ID.
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRow>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, username, email, password, auth_version
                FROM users
                WHERE id = $1
                "#,
                &[&user_id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }
}

#[async_trait]
impl CredentialVerifier for PgUserRepository {
    async fn verify_credentials(&self, username: &str, password: &str) -> Result<VerifiedUser> {
        tracing::debug!("🔐 Authenticating user: {}", username);

        let Some(user) = self.find_by_username(username).await? else {
            let candidate = password.to_string();
            let _ = tokio::task::spawn_blocking(move || {
                passwords::verify_against_dummy(&candidate)
            })
            .await;
            return Err(AppError::Authentication(format!("unknown user {}", username)));
        };

        if !verify_blocking(password, user.password).await? {
            return Err(AppError::Authentication(format!(
                "wrong password for {}",
                user.id
            )));
        }

        tracing::info!("✅ User authenticated: {}", user.id);
        Ok(VerifiedUser {
            id: user.id,
            username: user.username,
            email: user.email,
            auth_version: user.auth_version,
        })
    }

    async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        tracing::info!("🔑 Changing password for user: {}", user_id);

        let user = self.find_by_id(user_id).await?.ok_or(AppError::NotFound)?;
        if !verify_blocking(current_password, user.password).await? {
            return Err(AppError::Authentication(format!(
                "wrong current password for {}",
                user_id
            )));
        }

        let new_password = new_password.to_string();
        let new_hash = tokio::task::spawn_blocking(move || passwords::hash_password(&new_password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;

        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE users
                SET password = $1, last_password_change = NOW(), auth_version = auth_version + 1
                WHERE id = $2
                "#,
                &[&new_hash, &user_id],
            )
            .await?;

        tracing::info!("✅ Password changed for user: {}", user_id);
        Ok(())
    }
}

#[async_trait]
impl RolePermissionProvider for PgUserRepository {
    async fn get_user_roles_and_permissions(&self, user_id: Uuid) -> Result<UserAccess> {
        let client = self.pool.get().await?;

        let auth_version: i64 = client
            .query_opt(
                "SELECT auth_version FROM users WHERE id = $1 AND is_active = true",
                &[&user_id],
            )
            .await?
            .ok_or(AppError::NotFound)?
            .try_get("auth_version")?;

        let roles = client
            .query(
                r#"
                SELECT r.name
                FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id
                WHERE ur.user_id = $1
                "#,
                &[&user_id],
            )
            .await?
            .iter()
            .map(|row| row.try_get::<_, String>("name"))
            .collect::<std::result::Result<_, _>>()?;

        let permissions = client
            .query(
                r#"
                SELECT DISTINCT p.name
                FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE ur.user_id = $1
                "#,
                &[&user_id],
            )
            .await?
            .iter()
            .map(|row| row.try_get::<_, String>("name"))
            .collect::<std::result::Result<_, _>>()?;

        tracing::debug!("🔎 Resolved roles for user {} (version {})", user_id, auth_version);
        Ok(UserAccess {
            roles,
            permissions,
            auth_version,
        })
    }
}
