use chrono::Duration;
use service_core::{error::AppError, utils::SharedClock};
use std::sync::Arc;
use uuid::Uuid;

use crate::{models::Session, store::SessionStore};

/// Owns the server-side session rows binding a session id to the current
/// refresh token.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    clock: SharedClock,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration, clock: SharedClock) -> Self {
        Self { store, ttl, clock }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        refresh_token: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<Uuid, AppError> {
        let session = Session::new(
            user_id,
            refresh_token,
            ip_address,
            user_agent,
            self.clock.now(),
            self.ttl,
        );
        self.store.insert_session(&session).await?;

        tracing::debug!(session_id = %session.session_id, user_id = %user_id, "Session created");
        Ok(session.session_id)
    }

    /// Expired rows are reported as absent.
    pub async fn get(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        self.store
            .find_live_session(session_id, self.clock.now())
            .await
    }

    /// Bind a new refresh token and push expiry to `now + ttl`. Returns
    /// `false` if the session is gone or expired.
    pub async fn rotate(&self, session_id: Uuid, refresh_token: &str) -> Result<bool, AppError> {
        let now = self.clock.now();
        self.store
            .rotate_session(session_id, refresh_token, now + self.ttl, now)
            .await
    }

    pub async fn delete(&self, session_id: Uuid) -> Result<bool, AppError> {
        self.store.delete_session(session_id).await
    }

    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let removed = self.store.delete_sessions_for_user(user_id).await?;
        if removed > 0 {
            tracing::info!(user_id = %user_id, removed, "Revoked all sessions for user");
        }
        Ok(removed)
    }

    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        self.store.delete_expired_sessions(self.clock.now()).await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use service_core::utils::{Clock, ManualClock};

    fn manager() -> (SessionManager, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let manager = SessionManager::new(store.clone(), Duration::days(7), clock.clone());
        (manager, store, clock)
    }

    #[tokio::test]
    async fn test_create_sets_seven_day_expiry() {
        let (manager, _, clock) = manager();
        let user_id = Uuid::new_v4();

        let id = manager
            .create(user_id, "rt-1".to_string(), Some("10.0.0.1".to_string()), None)
            .await
            .unwrap();
        let session = manager.get(id).await.unwrap().unwrap();

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.refresh_token, "rt-1");
        assert_eq!(session.expires_utc, session.created_utc + Duration::days(7));
        assert_eq!(session.created_utc, clock.now());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let (manager, store, clock) = manager();
        let id = manager
            .create(Uuid::new_v4(), "rt".to_string(), None, None)
            .await
            .unwrap();

        clock.advance(Duration::days(7));

        assert!(manager.get(id).await.unwrap().is_none());
        assert!(store.raw_session(id).await.is_some());
    }

    #[tokio::test]
    async fn test_rotate_replaces_token_and_extends_expiry() {
        let (manager, _, clock) = manager();
        let id = manager
            .create(Uuid::new_v4(), "old".to_string(), None, None)
            .await
            .unwrap();

        clock.advance(Duration::days(3));
        assert!(manager.rotate(id, "new").await.unwrap());

        let session = manager.get(id).await.unwrap().unwrap();
        assert_ne!(session.refresh_token, "old");
        assert_eq!(session.refresh_token, "new");
        assert_eq!(session.expires_utc, clock.now() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_rotate_expired_or_missing_session_fails() {
        let (manager, _, clock) = manager();
        let id = manager
            .create(Uuid::new_v4(), "old".to_string(), None, None)
            .await
            .unwrap();

        assert!(!manager.rotate(Uuid::new_v4(), "new").await.unwrap());

        clock.advance(Duration::days(8));
        assert!(!manager.rotate(id, "new").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_for_user_and_sweep() {
        let (manager, store, clock) = manager();
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();

        manager.create(user_id, "a".into(), None, None).await.unwrap();
        manager.create(user_id, "b".into(), None, None).await.unwrap();
        let kept = manager.create(other, "c".into(), None, None).await.unwrap();

        assert_eq!(manager.delete_all_for_user(user_id).await.unwrap(), 2);
        assert_eq!(store.session_count().await, 1);

        clock.advance(Duration::days(1));
        let fresh = manager.create(other, "d".into(), None, None).await.unwrap();
        clock.advance(Duration::days(6) + Duration::seconds(1));

        assert_eq!(manager.sweep_expired().await.unwrap(), 1);
        assert!(store.raw_session(kept).await.is_none());
        assert!(manager.get(fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (manager, _, _) = manager();
        let id = manager
            .create(Uuid::new_v4(), "rt".to_string(), None, None)
            .await
            .unwrap();

        assert!(manager.delete(id).await.unwrap());
        assert!(!manager.delete(id).await.unwrap());
    }
}
