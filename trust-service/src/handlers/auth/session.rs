use axum::{extract::State, http::header, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use super::cookies::{
    clear_credentials, credential_cookie, session_id_from, ACCESS_TOKEN_COOKIE, SESSION_COOKIE,
};
use crate::{
    dtos::{
        auth::{LoginRequest, LoginResponse, RefreshResponse, VerifyResponse},
        MessageResponse,
    },
    services::{RequestContext, ServiceError},
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    params(("x-csrf-token" = String, Header, description = "CSRF token echoed from the csrf_token cookie")),
    responses(
        (status = 200, description = "Login successful; access_token and session_id cookies set", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .auth_service
        .login(&req.username, Password::new(req.password), &ctx)
        .await?;

    let secure = state.config.secure_cookies();
    let jar = jar
        .add(credential_cookie(
            ACCESS_TOKEN_COOKIE,
            outcome.tokens.access_token.clone(),
            state.config.access_token_ttl(),
            secure,
        ))
        .add(credential_cookie(
            SESSION_COOKIE,
            outcome.session_id.to_string(),
            state.config.session_ttl(),
            secure,
        ));

    Ok((
        jar,
        Json(LoginResponse {
            user: outcome.user,
            access_token: outcome.tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: outcome.tokens.expires_in,
            session_id: outcome.session_id,
        }),
    ))
}

/// Rotate the session's refresh token and issue a new access token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Token refreshed; access_token and session_id cookies updated", body = RefreshResponse),
        (status = 401, description = "Missing, expired or invalid session", body = ErrorResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .auth_service
        .refresh(session_id_from(&jar), &ctx)
        .await?;

    // Rotation pushes the session expiry forward; the cookie follows it.
    let secure = state.config.secure_cookies();
    let jar = jar
        .add(credential_cookie(
            ACCESS_TOKEN_COOKIE,
            outcome.tokens.access_token.clone(),
            state.config.access_token_ttl(),
            secure,
        ))
        .add(credential_cookie(
            SESSION_COOKIE,
            outcome.session_id.to_string(),
            state.config.session_ttl(),
            secure,
        ));

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: outcome.tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: outcome.tokens.expires_in,
        }),
    ))
}

/// Introspect the current session
#[utoipa::path(
    get,
    path = "/auth/verify",
    responses(
        (status = 200, description = "Session is valid", body = VerifyResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn verify(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
        .ok_or(ServiceError::Unauthorized)?;

    let user = state
        .auth_service
        .verify(&token, session_id_from(&jar))
        .await?;

    Ok(Json(VerifyResponse {
        authenticated: true,
        user,
    }))
}

/// Logout: delete the session and clear credential cookies
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out (also when no session was present)", body = MessageResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .logout(session_id_from(&jar), &ctx)
        .await?;

    Ok((
        clear_credentials(jar, state.config.secure_cookies()),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}
