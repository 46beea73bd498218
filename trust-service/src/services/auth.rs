use serde_json::json;
use service_core::utils::SharedClock;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{AuditAction, AuditEvent, AuditStatus, Session, User, UserProfile},
    services::{
        AccessTokenClaims, AuditRecorder, EmailProvider, PasswordResetManager, ServiceError,
        SessionManager, TokenPair, TokenService, TokenSubject,
    },
    store::UserStore,
    utils::{hash_password, verify_dummy_password, verify_password, Password, PasswordHashString},
};

/// Client facts attached to audit events.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub session_id: Uuid,
    pub user: UserProfile,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub tokens: TokenPair,
    pub session_id: Uuid,
}

/// A verified access token together with the live session it belongs to.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub claims: AccessTokenClaims,
    pub session: Session,
}

/// Composes tokens, sessions, reset tokens and the audit trail into the
/// login, refresh, verify and logout flows.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    sessions: SessionManager,
    resets: PasswordResetManager,
    audit: AuditRecorder,
    email: Arc<dyn EmailProvider>,
    public_base_url: String,
    clock: SharedClock,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        sessions: SessionManager,
        resets: PasswordResetManager,
        audit: AuditRecorder,
        email: Arc<dyn EmailProvider>,
        public_base_url: String,
        clock: SharedClock,
    ) -> Self {
        Self {
            users,
            tokens,
            sessions,
            resets,
            audit,
            email,
            public_base_url,
            clock,
        }
    }

    pub async fn login(
        &self,
        username: &str,
        password: Password,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, ServiceError> {
        let user = match self.users.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                verify_dummy_password(&password);
                self.login_failed(None, username, "unknown_user", ctx).await;
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if !user.is_active {
            verify_dummy_password(&password);
            self.login_failed(Some(user.user_id), username, "inactive", ctx)
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        if !verify_password(&password, &PasswordHashString::new(user.password_hash.clone())) {
            self.login_failed(Some(user.user_id), username, "bad_password", ctx)
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        let tokens = self.tokens.mint_pair(&subject_of(&user))?;
        let session_id = self
            .sessions
            .create(
                user.user_id,
                tokens.refresh_token.clone(),
                ctx.ip_address.clone(),
                ctx.user_agent.clone(),
            )
            .await?;

        tracing::info!(user_id = %user.user_id, session_id = %session_id, "User logged in");
        self.audit
            .record(
                AuditEvent::success(AuditAction::SessionCreate)
                    .with_user(user.user_id)
                    .with_resource("session", session_id)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone()),
            )
            .await;
        self.audit
            .record(
                AuditEvent::success(AuditAction::LoginSuccess)
                    .with_user(user.user_id)
                    .with_resource("session", session_id)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone()),
            )
            .await;

        Ok(LoginOutcome {
            tokens,
            session_id,
            user: user.profile(),
        })
    }

    /// Exchange the refresh token bound to a session for a new pair and
    /// rotate the session.
    pub async fn refresh(
        &self,
        session_id: Option<Uuid>,
        ctx: &RequestContext,
    ) -> Result<RefreshOutcome, ServiceError> {
        let session_id = session_id.ok_or(ServiceError::Unauthorized)?;
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        let claims = self
            .tokens
            .verify_refresh(&session.refresh_token)
            .map_err(|reason| {
                tracing::debug!(session_id = %session_id, reason = %reason, "Refresh token rejected");
                ServiceError::Unauthorized
            })?;
        if claims.sub != session.user_id {
            tracing::warn!(session_id = %session_id, "Refresh token subject does not match session");
            return Err(ServiceError::Unauthorized);
        }

        let user = self
            .users
            .find_user_by_id(session.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::Unauthorized)?;

        let tokens = self.tokens.mint_pair(&subject_of(&user))?;
        if !self
            .sessions
            .rotate(session_id, &tokens.refresh_token)
            .await?
        {
            return Err(ServiceError::Unauthorized);
        }

        tracing::info!(user_id = %user.user_id, session_id = %session_id, "Session rotated");
        self.audit
            .record(
                AuditEvent::success(AuditAction::TokenRefresh)
                    .with_user(user.user_id)
                    .with_resource("session", session_id)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone()),
            )
            .await;

        Ok(RefreshOutcome { tokens, session_id })
    }

    /// Verify the access token and cross-check it against a live session of
    /// the same user.
    pub async fn authenticate(
        &self,
        access_token: &str,
        session_id: Option<Uuid>,
    ) -> Result<Authenticated, ServiceError> {
        let claims = self.tokens.verify_access(access_token).map_err(|reason| {
            tracing::debug!(reason = %reason, "Access token rejected");
            ServiceError::Unauthorized
        })?;

        let session_id = session_id.ok_or(ServiceError::Unauthorized)?;
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        if session.user_id != claims.sub {
            tracing::warn!(
                session_id = %session_id,
                token_subject = %claims.sub,
                "Access token does not belong to session"
            );
            return Err(ServiceError::Unauthorized);
        }

        Ok(Authenticated { claims, session })
    }

    pub async fn verify(
        &self,
        access_token: &str,
        session_id: Option<Uuid>,
    ) -> Result<UserProfile, ServiceError> {
        let auth = self.authenticate(access_token, session_id).await?;
        self.users
            .find_user_by_id(auth.claims.sub)
            .await?
            .filter(|u| u.is_active)
            .map(|u| u.profile())
            .ok_or(ServiceError::Unauthorized)
    }

    /// Idempotent: a missing or unknown session id is not an error.
    pub async fn logout(
        &self,
        session_id: Option<Uuid>,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let Some(session_id) = session_id else {
            return Ok(());
        };

        let user_id = self.sessions.get(session_id).await?.map(|s| s.user_id);
        let removed = self.sessions.delete(session_id).await?;
        tracing::info!(session_id = %session_id, removed, "User logged out");

        let session_event = |action| {
            let event = AuditEvent::success(action)
                .with_resource("session", session_id)
                .with_client(ctx.ip_address.clone(), ctx.user_agent.clone());
            match user_id {
                Some(user_id) => event.with_user(user_id),
                None => event,
            }
        };
        if removed {
            self.audit
                .record(
                    session_event(AuditAction::SessionDestroy)
                        .with_details(json!({ "revoked_sessions": 1 })),
                )
                .await;
        }
        self.audit.record(session_event(AuditAction::Logout)).await;

        Ok(())
    }

    /// Issue a reset token and mail it. Unknown or inactive accounts produce
    /// `None` so that callers can answer every request identically.
    pub async fn request_password_reset(
        &self,
        email: &str,
        ctx: &RequestContext,
    ) -> Result<Option<String>, ServiceError> {
        let user = match self.users.find_user_by_email(email).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.audit
                    .record(
                        AuditEvent::failure(AuditAction::PasswordResetRequest)
                            .with_client(ctx.ip_address.clone(), ctx.user_agent.clone())
                            .with_details(json!({ "reason": "unknown_account" })),
                    )
                    .await;
                return Ok(None);
            }
        };

        let token = self.resets.issue(user.user_id).await?;

        let status = match self
            .email
            .send_password_reset_email(&user.email, &token, &self.public_base_url)
            .await
        {
            Ok(()) => AuditStatus::Success,
            Err(e) => {
                tracing::error!(error = %e, user_id = %user.user_id, "Password reset email not delivered");
                AuditStatus::Error
            }
        };

        self.audit
            .record(
                AuditEvent::new(AuditAction::PasswordResetRequest, status)
                    .with_user(user.user_id)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone()),
            )
            .await;

        Ok(Some(token))
    }

    pub async fn reset_token_valid(&self, token: &str) -> Result<bool, ServiceError> {
        Ok(self.resets.lookup(token).await?.is_some())
    }

    /// Spend a reset token, set the new password and end every session of
    /// the user.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: Password,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let Some(user_id) = self.resets.consume(token, &new_password).await? else {
            self.audit
                .record(
                    AuditEvent::failure(AuditAction::PasswordResetSuccess)
                        .with_client(ctx.ip_address.clone(), ctx.user_agent.clone())
                        .with_details(json!({ "reason": "invalid_token" })),
                )
                .await;
            return Err(ServiceError::InvalidResetToken);
        };

        let revoked = self.sessions.delete_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Password reset completed");

        self.audit
            .record(
                AuditEvent::success(AuditAction::PasswordResetSuccess)
                    .with_user(user_id)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone())
                    .with_details(json!({ "revoked_sessions": revoked })),
            )
            .await;

        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: Password,
        new_password: Password,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        if !verify_password(
            &current_password,
            &PasswordHashString::new(user.password_hash.clone()),
        ) {
            self.audit
                .record(
                    AuditEvent::failure(AuditAction::PasswordChange)
                        .with_user(user_id)
                        .with_client(ctx.ip_address.clone(), ctx.user_agent.clone())
                        .with_details(json!({ "reason": "bad_password" })),
                )
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        if current_password.as_str() == new_password.as_str() {
            return Err(ServiceError::ValidationError(
                "New password must differ from the current password".to_string(),
            ));
        }

        let hash = hash_password(&new_password)?;
        if !self
            .users
            .update_password_hash(user_id, hash.as_str(), self.clock.now())
            .await?
        {
            return Err(ServiceError::Unauthorized);
        }

        tracing::info!(user_id = %user_id, "Password changed");
        self.audit
            .record(
                AuditEvent::success(AuditAction::PasswordChange)
                    .with_user(user_id)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone()),
            )
            .await;

        Ok(())
    }

    /// Administrative revocation of every session of `target`.
    pub async fn revoke_user_sessions(
        &self,
        actor: Uuid,
        target: Uuid,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        if self.users.find_user_by_id(target).await?.is_none() {
            return Err(ServiceError::UserNotFound);
        }

        let revoked = self.sessions.delete_all_for_user(target).await?;

        self.audit
            .record(
                AuditEvent::success(AuditAction::SessionDestroy)
                    .with_user(actor)
                    .with_resource("user", target)
                    .with_client(ctx.ip_address.clone(), ctx.user_agent.clone())
                    .with_details(json!({ "revoked_sessions": revoked })),
            )
            .await;

        Ok(revoked)
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn resets(&self) -> &PasswordResetManager {
        &self.resets
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn login_failed(
        &self,
        user_id: Option<Uuid>,
        username: &str,
        reason: &str,
        ctx: &RequestContext,
    ) {
        tracing::info!(username = %username, reason, "Login failed");

        let mut event = AuditEvent::failure(AuditAction::LoginFailure)
            .with_client(ctx.ip_address.clone(), ctx.user_agent.clone())
            .with_details(json!({ "username": username, "reason": reason }));
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        self.audit.record(event).await;
    }
}

fn subject_of(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.user_id,
        username: user.username.clone(),
        role: user.role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::Role,
        services::MockEmailService,
        store::MemoryStore,
    };
    use chrono::Duration;
    use service_core::utils::{Clock, ManualClock};

    struct Fixture {
        service: AuthService,
        store: Arc<MemoryStore>,
        email: Arc<MockEmailService>,
        clock: Arc<ManualClock>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let email = Arc::new(MockEmailService::new());

        let hash = hash_password(&Password::new("CorrectHorse1!".to_string())).unwrap();
        let user = User::new(
            "jdoe".to_string(),
            "jdoe@school.example".to_string(),
            hash.into_string(),
            Some("Jane Doe".to_string()),
            Role::Teacher,
        );
        store.insert_user(&user).await.unwrap();

        let tokens = TokenService::new(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(15),
            Duration::days(7),
            clock.clone(),
        )
        .unwrap();
        let service = AuthService::new(
            store.clone(),
            tokens,
            SessionManager::new(store.clone(), Duration::days(7), clock.clone()),
            PasswordResetManager::new(store.clone(), Duration::hours(1), clock.clone()),
            AuditRecorder::new(store.clone(), clock.clone()),
            email.clone(),
            "http://localhost:8080".to_string(),
            clock.clone(),
        );

        Fixture {
            service,
            store,
            email,
            clock,
            user,
        }
    }

    fn pw(s: &str) -> Password {
        Password::new(s.to_string())
    }

    async fn last_event(store: &MemoryStore) -> AuditEvent {
        store.audit_events().await.pop().unwrap()
    }

    #[tokio::test]
    async fn test_failed_logins_record_reason_without_leaking_it() {
        let f = fixture().await;
        let ctx = RequestContext::default();

        let unknown = f.service.login("nobody", pw("x"), &ctx).await.unwrap_err();
        assert!(matches!(unknown, ServiceError::InvalidCredentials));
        let event = last_event(&f.store).await;
        assert_eq!(event.action, AuditAction::LoginFailure);
        assert_eq!(event.details.unwrap()["reason"], "unknown_user");

        let wrong = f.service.login("jdoe", pw("wrong"), &ctx).await.unwrap_err();
        assert!(matches!(wrong, ServiceError::InvalidCredentials));
        let event = last_event(&f.store).await;
        assert_eq!(event.user_id, Some(f.user.user_id));
        assert_eq!(event.details.unwrap()["reason"], "bad_password");
    }

    #[tokio::test]
    async fn test_login_verify_logout() {
        let f = fixture().await;
        let ctx = RequestContext {
            ip_address: Some("10.1.2.3".to_string()),
            user_agent: Some("test-agent".to_string()),
        };

        let login = f
            .service
            .login("jdoe", pw("CorrectHorse1!"), &ctx)
            .await
            .unwrap();
        let profile = f
            .service
            .verify(&login.tokens.access_token, Some(login.session_id))
            .await
            .unwrap();
        assert_eq!(profile.user_id, f.user.user_id);

        f.service.logout(Some(login.session_id), &ctx).await.unwrap();
        assert!(f
            .service
            .verify(&login.tokens.access_token, Some(login.session_id))
            .await
            .is_err());

        let event = last_event(&f.store).await;
        assert_eq!(event.action, AuditAction::Logout);
        assert_eq!(event.user_id, Some(f.user.user_id));
        assert_eq!(event.ip_address.as_deref(), Some("10.1.2.3"));
    }

    #[tokio::test]
    async fn test_refresh_rotates_bound_token() {
        let f = fixture().await;
        let ctx = RequestContext::default();
        let login = f
            .service
            .login("jdoe", pw("CorrectHorse1!"), &ctx)
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(20));
        let refreshed = f
            .service
            .refresh(Some(login.session_id), &ctx)
            .await
            .unwrap();

        let session = f.store.raw_session(login.session_id).await.unwrap();
        assert_ne!(session.refresh_token, login.tokens.refresh_token);
        assert_eq!(session.refresh_token, refreshed.tokens.refresh_token);
        assert_eq!(session.expires_utc, f.clock.now() + Duration::days(7));

        // the old access token has expired, the new one works
        assert!(f
            .service
            .verify(&login.tokens.access_token, Some(login.session_id))
            .await
            .is_err());
        assert!(f
            .service
            .verify(&refreshed.tokens.access_token, Some(login.session_id))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_access_token_of_other_user_is_rejected() {
        let f = fixture().await;
        let ctx = RequestContext::default();

        let hash = hash_password(&pw("OtherPass1!")).unwrap();
        let other = User::new(
            "other".to_string(),
            "other@school.example".to_string(),
            hash.into_string(),
            None,
            Role::Staff,
        );
        f.store.insert_user(&other).await.unwrap();

        let mine = f.service.login("jdoe", pw("CorrectHorse1!"), &ctx).await.unwrap();
        let theirs = f.service.login("other", pw("OtherPass1!"), &ctx).await.unwrap();

        assert!(f
            .service
            .verify(&theirs.tokens.access_token, Some(mine.session_id))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reset_revokes_sessions_and_changes_password() {
        let f = fixture().await;
        let ctx = RequestContext::default();
        let login = f.service.login("jdoe", pw("CorrectHorse1!"), &ctx).await.unwrap();

        let token = f
            .service
            .request_password_reset("jdoe@school.example", &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            f.email.last_token_for("jdoe@school.example").as_deref(),
            Some(token.as_str())
        );

        f.service
            .confirm_password_reset(&token, pw("BrandNew1!"), &ctx)
            .await
            .unwrap();

        assert!(f.service.sessions().get(login.session_id).await.unwrap().is_none());
        assert!(f.service.login("jdoe", pw("CorrectHorse1!"), &ctx).await.is_err());
        assert!(f.service.login("jdoe", pw("BrandNew1!"), &ctx).await.is_ok());
        assert!(matches!(
            f.service.confirm_password_reset(&token, pw("Again1!!"), &ctx).await,
            Err(ServiceError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_reset_for_unknown_email_is_silent() {
        let f = fixture().await;
        let result = f
            .service
            .request_password_reset("ghost@school.example", &RequestContext::default())
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(f.email.sent().is_empty());
        assert_eq!(last_event(&f.store).await.status, AuditStatus::Failure);
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let f = fixture().await;
        let ctx = RequestContext::default();

        assert!(matches!(
            f.service
                .change_password(f.user.user_id, pw("wrong"), pw("BrandNew1!"), &ctx)
                .await,
            Err(ServiceError::InvalidCredentials)
        ));

        f.service
            .change_password(f.user.user_id, pw("CorrectHorse1!"), pw("BrandNew1!"), &ctx)
            .await
            .unwrap();
        assert!(f.service.login("jdoe", pw("BrandNew1!"), &ctx).await.is_ok());
    }
}
