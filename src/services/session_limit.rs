use uuid::Uuid;

use crate::kv::StoreResult;
use crate::models::session::id_prefix;
use crate::repositories::session::SessionStore;

/// Caps how many sessions a user may hold at once.
#[derive(Clone)]
pub struct ConcurrentSessionLimiter {
    sessions: SessionStore,
}

impl ConcurrentSessionLimiter {
    /// Creates a new `ConcurrentSessionLimiter`.
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Revokes the user's oldest sessions until at most `max` remain.
    ///
    /// Runs once per login. Sessions are ordered by creation time, then by
    /// insertion order. A `max` of zero means no limit.
    ///
    /// # Returns
    ///
    /// How many sessions were evicted.
    pub async fn limit_concurrent_sessions(&self, user_id: Uuid, max: usize) -> StoreResult<usize> {
        if max == 0 {
            return Ok(0);
        }

        let live = self.sessions.active_sessions(user_id).await?;
        if live.len() <= max {
            return Ok(0);
        }

        let excess = live.len() - max;
        for record in &live[..excess] {
            self.sessions
                .revoke_for_user(user_id, &record.session_id)
                .await?;
            tracing::info!(
                "✂️ Evicted session {} of user {} (limit {})",
                id_prefix(&record.session_id),
                user_id,
                max
            );
        }

        Ok(excess)
    }
}
