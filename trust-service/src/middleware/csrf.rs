use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    services::{CSRF_COOKIE, CSRF_HEADER},
    AppState,
};

/// Double-submit check for every state-changing request.
pub async fn csrf_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }

    let header = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value());

    if !state.csrf.verify(cookie, header) {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            has_cookie = cookie.is_some(),
            has_header = header.is_some(),
            "CSRF validation failed"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!("Invalid CSRF token")));
    }

    Ok(next.run(req).await)
}
