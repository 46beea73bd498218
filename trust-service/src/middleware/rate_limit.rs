use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::{
    error::AppError,
    middleware::rate_limit::{request_client_ip, with_rate_limit_headers, SharedRateLimiter},
};

use crate::{
    middleware::context::request_context,
    models::{AuditAction, AuditEvent},
    services::AuditRecorder,
};

/// State of [`rate_limit_middleware`]: one limiter per protected route group.
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: SharedRateLimiter,
    pub audit: AuditRecorder,
    /// Name recorded with rejections, e.g. `login`.
    pub scope: &'static str,
}

impl RateLimitGuard {
    pub fn new(limiter: SharedRateLimiter, audit: AuditRecorder, scope: &'static str) -> Self {
        Self {
            limiter,
            audit,
            scope,
        }
    }
}

/// Fixed-window throttle keyed by client address. Every response carries
/// the limit metadata headers; rejections are 429 with `Retry-After`.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    let key = request_client_ip(&request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = guard.limiter.check(&key);
    if decision.allowed {
        let response = next.run(request).await;
        return with_rate_limit_headers(response, &decision);
    }

    let retry_after = decision.retry_after_secs(guard.limiter.now());
    tracing::warn!(
        client = %key,
        scope = guard.scope,
        count = decision.count,
        limit = decision.limit,
        retry_after,
        "Rate limit exceeded"
    );

    let ctx = request_context(request.headers(), request.extensions());
    guard.audit.record_detached(
        AuditEvent::failure(AuditAction::RateLimitExceeded)
            .with_resource("route", request.uri().path())
            .with_client(ctx.ip_address, ctx.user_agent)
            .with_details(serde_json::json!({
                "scope": guard.scope,
                "count": decision.count,
                "limit": decision.limit,
            })),
    );

    let response = AppError::TooManyRequests(
        "Too many requests. Please try again later.".to_string(),
        Some(retry_after),
    )
    .into_response();
    with_rate_limit_headers(response, &decision)
}
