//! Credential store.
//!
//! Persistence for users, sessions, password reset tokens and audit events.
//! Every time-sensitive query takes `now` from the caller so expiry is
//! filtered by the store itself and follows the injected clock.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditEvent, PasswordResetToken, Session, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    /// Returns `false` when no such user exists.
    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), AppError>;

    /// Only rows with `expires_utc > now`.
    async fn find_live_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError>;

    /// Single atomic update of a live row. Returns `false` when the session
    /// is absent or already expired.
    async fn rotate_session(
        &self,
        session_id: Uuid,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn delete_session(&self, session_id: Uuid) -> Result<bool, AppError>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), AppError>;

    /// Only rows with `used = false AND expires_utc > now`.
    async fn find_valid_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordResetToken>, AppError>;

    /// Claim a valid token and store the new password hash as one atomic
    /// unit. Returns the owning user id, or `None` (and writes nothing) when
    /// the token is unknown, used or expired at `now`.
    async fn complete_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError>;

    /// Delete used or expired tokens.
    async fn delete_spent_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Append-only destination of audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), AppError>;
}

/// The store handles the service is wired with.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub reset_tokens: Arc<dyn ResetTokenStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            sessions: store.clone(),
            reset_tokens: store.clone(),
            audit: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            reset_tokens: store.clone(),
            audit: store,
        }
    }

    /// Same stores, different audit destination.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}
