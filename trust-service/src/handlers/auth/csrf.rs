use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use super::cookies::{credential_cookie, CSRF_COOKIE};
use crate::{dtos::auth::CsrfTokenResponse, services::CSRF_HEADER, AppState};

/// Issue (or re-issue) the CSRF token
#[utoipa::path(
    get,
    path = "/auth/csrf",
    responses(
        (status = 200, description = "CSRF token issued and cookie set", body = CsrfTokenResponse)
    ),
    tag = "Authentication"
)]
pub async fn issue_csrf_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let existing = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let token = state.csrf.issue(existing.as_deref())?;

    let jar = if token.fresh {
        jar.add(credential_cookie(
            CSRF_COOKIE,
            token.value.clone(),
            state.config.csrf_cookie_ttl(),
            state.config.secure_cookies(),
        ))
    } else {
        jar
    };

    Ok((
        jar,
        Json(CsrfTokenResponse {
            csrf_token: token.value,
            header_name: CSRF_HEADER.to_string(),
        }),
    ))
}
