//! In-process credential store for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditSink, ResetTokenStore, SessionStore, UserStore};
use crate::models::{AuditEvent, PasswordResetToken, Session, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    audit_events: Vec<AuditEvent>,
}

/// Every operation takes the single table lock, which gives each call the
/// same all-or-nothing behaviour as a statement or transaction in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit trail, oldest first.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.tables.read().await.audit_events.clone()
    }

    /// Session row regardless of expiry.
    pub async fn raw_session(&self, session_id: Uuid) -> Option<Session> {
        self.tables.read().await.sessions.get(&session_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    pub async fn reset_token_count(&self) -> usize {
        self.tables.read().await.reset_tokens.len()
    }

    /// Reset token row regardless of state.
    pub async fn raw_reset_token(&self, token_hash: &str) -> Option<PasswordResetToken> {
        self.tables.read().await.reset_tokens.get(token_hash).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.users.values().any(|u| {
            u.user_id == user.user_id
                || u.username == user.username
                || u.email.eq_ignore_ascii_case(&user.email)
        });
        if duplicate {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "duplicate key value violates unique constraint on users"
            )));
        }
        tables.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_utc = now;
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.session_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "duplicate key value violates unique constraint on sessions"
            )));
        }
        tables.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_live_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .get(&session_id)
            .filter(|s| s.is_live_at(now))
            .cloned())
    }

    async fn rotate_session(
        &self,
        session_id: Uuid,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.sessions.get_mut(&session_id) {
            Some(session) if session.is_live_at(now) => {
                session.refresh_token = refresh_token.to_string();
                session.expires_utc = expires_utc;
                true
            }
            _ => false,
        })
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .tables
            .write()
            .await
            .sessions
            .remove(&session_id)
            .is_some())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.is_live_at(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.reset_tokens.contains_key(&token.token_hash) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "duplicate key value violates unique constraint on password_reset_tokens"
            )));
        }
        tables
            .reset_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_valid_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordResetToken>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .reset_tokens
            .get(token_hash)
            .filter(|t| t.is_valid_at(now))
            .cloned())
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tables = self.tables.write().await;

        let user_id = match tables.reset_tokens.get(token_hash) {
            Some(token) if token.is_valid_at(now) => token.user_id,
            _ => return Ok(None),
        };
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.password_hash = new_password_hash.to_string();
        user.updated_utc = now;

        if let Some(token) = tables.reset_tokens.get_mut(token_hash) {
            token.used = true;
        }
        Ok(Some(user_id))
    }

    async fn delete_spent_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, t| !t.is_spent_at(now));
        Ok((before - tables.reset_tokens.len()) as u64)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), AppError> {
        self.tables.write().await.audit_events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn user(username: &str) -> User {
        User::new(
            username.to_string(),
            format!("{}@school.example", username),
            "hash".to_string(),
            None,
            Role::Staff,
        )
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&user("jdoe")).await.unwrap();

        let mut other = user("jdoe");
        other.email = "other@school.example".to_string();
        assert!(store.insert_user(&other).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_differing_in_case_is_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&user("jdoe")).await.unwrap();

        let mut other = user("jane");
        other.email = "JDoe@School.Example".to_string();
        assert!(store.insert_user(&other).await.is_err());
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        let u = user("jdoe");
        store.insert_user(&u).await.unwrap();

        let found = store
            .find_user_by_email("JDOE@School.Example")
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.user_id), Some(u.user_id));
    }

    #[tokio::test]
    async fn test_reset_completion_without_user_writes_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let token = PasswordResetToken::new(Uuid::new_v4(), "orphan", now, Duration::hours(1));
        store.insert_reset_token(&token).await.unwrap();

        let result = store
            .complete_password_reset(&token.token_hash, "new-hash", now)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert!(!store.raw_reset_token(&token.token_hash).await.unwrap().used);
    }
}
