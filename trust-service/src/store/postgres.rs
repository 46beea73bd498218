//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{postgres::PgPool, FromRow};
use uuid::Uuid;

use super::{AuditSink, ResetTokenStore, SessionStore, UserStore};
use crate::models::{AuditEvent, PasswordResetToken, Role, Session, User};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    user_id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    role_code: String,
    is_active: bool,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role_code
            .parse()
            .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(User {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            role,
            is_active: row.is_active,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!(e))
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(&self, sql: &str, value: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.fetch_user("SELECT * FROM users WHERE username = $1", username)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.fetch_user("SELECT * FROM users WHERE LOWER(email) = LOWER($1)", email)
            .await
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, password_hash, full_name, role_code, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_utc = $2 WHERE user_id = $3")
                .bind(password_hash)
                .bind(now)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, refresh_token, ip_address, user_agent, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.refresh_token)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.expires_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_live_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE session_id = $1 AND expires_utc > $2",
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn rotate_session(
        &self,
        session_id: Uuid,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET refresh_token = $1, expires_utc = $2
            WHERE session_id = $3 AND expires_utc > $4
            "#,
        )
        .bind(refresh_token)
        .bind(expires_utc)
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token_id, user_id, token_hash, expires_utc, used, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.token_id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_utc)
        .bind(token.used)
        .bind(token.created_utc)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_valid_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PasswordResetToken>, AppError> {
        sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT * FROM password_reset_tokens
            WHERE token_hash = $1 AND used = FALSE AND expires_utc > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // The conditional UPDATE is the claim: of two concurrent consumers
        // only one sees a returned row.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE password_reset_tokens SET used = TRUE
            WHERE token_hash = $1 AND used = FALSE AND expires_utc > $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let Some((user_id,)) = claimed else {
            tx.rollback().await.map_err(db_error)?;
            return Ok(None);
        };

        let updated =
            sqlx::query("UPDATE users SET password_hash = $1, updated_utc = $2 WHERE user_id = $3")
                .bind(new_password_hash)
                .bind(now)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db_error)?;
            return Ok(None);
        }

        tx.commit().await.map_err(db_error)?;
        Ok(Some(user_id))
    }

    async fn delete_spent_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM password_reset_tokens WHERE used = TRUE OR expires_utc <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (event_id, user_id, action_code, resource_type, resource_id, ip_address, user_agent, details, status_code, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.event_id)
        .bind(event.user_id)
        .bind(event.action.as_str())
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.details)
        .bind(event.status.as_str())
        .bind(event.created_utc)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
