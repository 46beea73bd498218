//! One-time password reset tokens.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Password reset token row. Only the SHA-256 digest of the token value is
/// stored; `used = true` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PasswordResetToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_utc: DateTime<Utc>,
    pub used: bool,
    pub created_utc: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn new(user_id: Uuid, token: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash: Self::hash_token(token),
            expires_utc: now + ttl,
            used: false,
            created_utc: now,
        }
    }

    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Valid for consumption iff unused and not yet expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_utc > now
    }

    /// Eligible for garbage collection.
    pub fn is_spent_at(&self, now: DateTime<Utc>) -> bool {
        self.used || self.expires_utc <= now
    }
}
