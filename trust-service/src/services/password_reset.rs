use chrono::Duration;
use service_core::{error::AppError, utils::SharedClock};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::PasswordResetToken,
    store::ResetTokenStore,
    utils::{hash_password, random_hex, Password},
};

const RESET_TOKEN_BYTES: usize = 32;

/// One-time, time-boxed password reset tokens. Issuing a token leaves any
/// earlier outstanding tokens for the same user valid.
#[derive(Clone)]
pub struct PasswordResetManager {
    store: Arc<dyn ResetTokenStore>,
    ttl: Duration,
    clock: SharedClock,
}

impl PasswordResetManager {
    pub fn new(store: Arc<dyn ResetTokenStore>, ttl: Duration, clock: SharedClock) -> Self {
        Self { store, ttl, clock }
    }

    /// Returns the plaintext token. Only its digest is persisted.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let token = random_hex(RESET_TOKEN_BYTES);
        let row = PasswordResetToken::new(user_id, &token, self.clock.now(), self.ttl);
        self.store.insert_reset_token(&row).await?;

        tracing::info!(user_id = %user_id, expires_utc = %row.expires_utc, "Password reset token issued");
        Ok(token)
    }

    pub async fn lookup(&self, token: &str) -> Result<Option<PasswordResetToken>, AppError> {
        self.store
            .find_valid_reset_token(&PasswordResetToken::hash_token(token), self.clock.now())
            .await
    }

    /// Set a new password and spend the token. Validity is checked again by
    /// the store at the moment of the claim. Returns the user id on success.
    pub async fn consume(
        &self,
        token: &str,
        new_password: &Password,
    ) -> Result<Option<Uuid>, AppError> {
        // Skip the hashing cost for tokens that are already dead.
        if self.lookup(token).await?.is_none() {
            return Ok(None);
        }

        let password_hash = hash_password(new_password)?;
        let user_id = self
            .store
            .complete_password_reset(
                &PasswordResetToken::hash_token(token),
                password_hash.as_str(),
                self.clock.now(),
            )
            .await?;

        if let Some(user_id) = user_id {
            tracing::info!(user_id = %user_id, "Password reset token consumed");
        }
        Ok(user_id)
    }

    /// Delete used and expired tokens.
    pub async fn cleanup(&self) -> Result<u64, AppError> {
        self.store.delete_spent_reset_tokens(self.clock.now()).await
    }
}
