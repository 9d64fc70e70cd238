use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A user whose credentials were just verified.
#[derive(Clone, Debug)]
pub struct VerifiedUser {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's email address.
    pub email: Option<String>,
    /// The user's current authorization version.
    pub auth_version: i64,
}

/// A user's roles, permissions and authorization version, as resolved by
/// the authority or the role cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccess {
    /// Role names.
    pub roles: BTreeSet<String>,
    /// Permission names, already expanded from roles.
    pub permissions: BTreeSet<String>,
    /// Bumped by the authority whenever roles or permissions change.
    pub auth_version: i64,
}
