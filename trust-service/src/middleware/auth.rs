use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    handlers::auth::cookies::{session_id_from, ACCESS_TOKEN_COOKIE},
    middleware::context::request_context,
    models::{AuditAction, AuditEvent, Role},
    services::{AccessTokenClaims, ServiceError},
    AppState,
};

/// Require a valid access token bound to a live session of the same user.
///
/// The access token is read from the `access_token` cookie or an
/// `Authorization: Bearer` header; the session id always comes from the
/// `session_id` cookie.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
        .ok_or(ServiceError::Unauthorized)?;

    let authenticated = state
        .auth_service
        .authenticate(&token, session_id_from(&jar))
        .await?;

    req.extensions_mut().insert(AuthUser {
        claims: authenticated.claims,
        session_id: authenticated.session.session_id,
    });

    Ok(next.run(req).await)
}

/// Must run after [`auth_middleware`]. Non-admin callers get 403 and an
/// `unauthorized_access` audit event.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(ServiceError::Unauthorized)?;

    if user.claims.role != Role::Admin {
        let ctx = request_context(req.headers(), req.extensions());
        tracing::warn!(user_id = %user.claims.sub, path = %req.uri().path(), "Admin route denied");
        state
            .auth_service
            .audit()
            .record(
                AuditEvent::failure(AuditAction::UnauthorizedAccess)
                    .with_user(user.claims.sub)
                    .with_resource("route", req.uri().path())
                    .with_client(ctx.ip_address, ctx.user_agent)
                    .with_details(serde_json::json!({ "required_role": "admin" })),
            )
            .await;
        return Err(ServiceError::Forbidden.into());
    }

    Ok(next.run(req).await)
}

/// Caller identity placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: AccessTokenClaims,
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn user_id(&self) -> Uuid {
        self.claims.sub
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Unauthorized")))
    }
}
