use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            ChangePasswordRequest, PasswordResetConfirm, PasswordResetRequest,
            PasswordResetRequestResponse, ResetTokenStatus,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    services::RequestContext,
    utils::{Password, ValidatedJson},
    AppState,
};

const RESET_REQUESTED_MESSAGE: &str =
    "If the account exists, a password reset link has been sent.";

/// Request a password reset link
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Request received", body = PasswordResetRequestResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state
        .auth_service
        .request_password_reset(&req.email, &ctx)
        .await?;

    // Outside development the token only travels by email.
    let reset_token = if state.config.is_prod() { None } else { token };

    Ok(Json(PasswordResetRequestResponse {
        message: RESET_REQUESTED_MESSAGE.to_string(),
        reset_token,
    }))
}

/// Check whether a reset token can still be used
#[utoipa::path(
    get,
    path = "/auth/password-reset/{token}",
    params(("token" = String, Path, description = "Password reset token")),
    responses(
        (status = 200, description = "Token status", body = ResetTokenStatus)
    ),
    tag = "Authentication"
)]
pub async fn reset_token_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let valid = state.auth_service.reset_token_valid(&token).await?;
    Ok(Json(ResetTokenStatus { valid }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password reset; all sessions of the user ended", body = MessageResponse),
        (status = 400, description = "Invalid, used or expired token", body = ErrorResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .confirm_password_reset(&req.token, Password::new(req.new_password), &ctx)
        .await?;

    Ok(Json(MessageResponse::new(
        "Password has been reset. Please log in again.",
    )))
}

/// Change the password of the signed-in user
#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password equals the current one", body = ErrorResponse),
        (status = 401, description = "Not authenticated or wrong current password", body = ErrorResponse),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .change_password(
            user.user_id(),
            Password::new(req.current_password),
            Password::new(req.new_password),
            &ctx,
        )
        .await?;

    Ok(Json(MessageResponse::new("Password changed")))
}
