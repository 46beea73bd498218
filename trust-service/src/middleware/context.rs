use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use service_core::middleware::rate_limit::client_ip;
use std::convert::Infallible;

use crate::services::RequestContext;

const MAX_USER_AGENT_LEN: usize = 512;

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(request_context(&parts.headers, &parts.extensions))
    }
}

/// Client address and user agent of a request, for audit events.
pub fn request_context(
    headers: &axum::http::HeaderMap,
    extensions: &axum::http::Extensions,
) -> RequestContext {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

    RequestContext {
        ip_address: client_ip(headers, extensions).map(|ip| ip.to_string()),
        user_agent,
    }
}
