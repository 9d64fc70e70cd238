use crate::error::AuthError;

/// Rejects sessions issued under an older authorization version.
///
/// A session freezes the version it saw at login. Once the authority bumps
/// the user's version, every older session is refused even though its
/// signature and expiry are still fine. A version of zero on either side
/// means no authority is tracking versions and the check is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthVersionGuard;

impl AuthVersionGuard {
    /// Compares the session's frozen version against the resolved one.
    pub fn check(&self, session_version: i64, current_version: i64) -> Result<(), AuthError> {
        if session_version > 0 && current_version > 0 && session_version != current_version {
            return Err(AuthError::AuthVersionStale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_versions_pass() {
        assert!(AuthVersionGuard.check(4, 4).is_ok());
    }

    #[test]
    fn differing_versions_are_stale() {
        assert_eq!(AuthVersionGuard.check(1, 2), Err(AuthError::AuthVersionStale));
        assert_eq!(AuthVersionGuard.check(3, 2), Err(AuthError::AuthVersionStale));
    }

    #[test]
    fn unset_versions_skip_the_check() {
        assert!(AuthVersionGuard.check(0, 7).is_ok());
        assert!(AuthVersionGuard.check(7, 0).is_ok());
        assert!(AuthVersionGuard.check(0, 0).is_ok());
    }
}
