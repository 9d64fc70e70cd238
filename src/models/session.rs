use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A server-side session, stored as JSON under its identifier.
///
/// Created at login; afterwards only `last_activity_at` is ever rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    /// The opaque identifier (the unsigned half of the cookie).
    pub session_id: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The user's username at login time.
    pub username: String,
    /// The user's email address at login time, if any.
    pub email: Option<String>,
    /// The authorization version observed at login.
    pub auth_version: i64,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last request seen on this session.
    pub last_activity_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
    /// Client IP at login. Diagnostic only.
    pub ip_address: Option<String>,
    /// Client user agent at login. Diagnostic only.
    pub user_agent: Option<String>,
}

impl SessionRecord {
    /// Whether the record's own absolute expiry has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The authenticated subject attached to a request after the session
/// middleware admits it.
///
/// Fields are private; there is no way to mutate a view once built.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(skip)]
    session_id: String,
    user_id: Uuid,
    username: String,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
    auth_version: i64,
}

impl SessionView {
    /// Builds a view of `record` with the roles resolved for this request.
    pub fn new(
        record: &SessionRecord,
        roles: BTreeSet<String>,
        permissions: BTreeSet<String>,
        auth_version: i64,
    ) -> Self {
        Self {
            session_id: record.session_id.clone(),
            user_id: record.user_id,
            username: record.username.clone(),
            roles,
            permissions,
            auth_version,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn auth_version(&self) -> i64 {
        self.auth_version
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// One row of a user's active-session listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// First characters of the session identifier.
    pub id_prefix: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Whether this is the session making the request.
    pub current: bool,
}

/// Shortens a session identifier for logs and listings.
pub fn id_prefix(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}

impl SessionSummary {
    /// Summarizes `record`, flagging it if it is `current_session_id`.
    pub fn of(record: &SessionRecord, current_session_id: &str) -> Self {
        Self {
            id_prefix: id_prefix(&record.session_id).to_string(),
            created_at: record.created_at,
            last_activity_at: record.last_activity_at,
            expires_at: record.expires_at,
            ip_address: record.ip_address.clone(),
            user_agent: record.user_agent.clone(),
            current: record.session_id == current_session_id,
        }
    }
}
