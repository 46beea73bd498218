use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::admin::RevokeSessionsResponse, middleware::AuthUser, services::RequestContext, AppState,
};

/// Revoke every session of a user
#[utoipa::path(
    delete,
    path = "/auth/admin/users/{user_id}/sessions",
    params(("user_id" = Uuid, Path, description = "User whose sessions are revoked")),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokeSessionsResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin or CSRF check failed", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    admin: AuthUser,
    ctx: RequestContext,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let revoked = state
        .auth_service
        .revoke_user_sessions(admin.user_id(), user_id, &ctx)
        .await?;

    tracing::info!(admin_id = %admin.user_id(), user_id = %user_id, revoked, "Sessions revoked by admin");

    Ok(Json(RevokeSessionsResponse {
        user_id,
        revoked_sessions: revoked,
    }))
}
