pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use service_core::middleware::{
    rate_limit::{RateLimitPolicy, RateLimiter, TrustedProxies},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use service_core::utils::clock::SharedClock;
use secrecy::ExposeSecret;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::TrustConfig;
use crate::middleware::RateLimitGuard;
use crate::services::{
    AuditRecorder, AuthService, CsrfGuard, EmailProvider, PasswordResetManager, SessionManager,
    TokenService, CSRF_HEADER,
};
use crate::store::Stores;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::csrf::issue_csrf_token,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::verify,
        handlers::auth::session::logout,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::reset_token_status,
        handlers::auth::password::confirm_password_reset,
        handlers::auth::password::change_password,
        handlers::admin::revoke_user_sessions,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::RefreshResponse,
            dtos::auth::VerifyResponse,
            dtos::auth::CsrfTokenResponse,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetRequestResponse,
            dtos::auth::PasswordResetConfirm,
            dtos::auth::ResetTokenStatus,
            dtos::auth::ChangePasswordRequest,
            dtos::admin::RevokeSessionsResponse,
            models::UserProfile,
            models::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, sessions, CSRF and password reset"),
        (name = "Admin", description = "Administrative operations"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TrustConfig>,
    pub stores: Stores,
    pub auth_service: AuthService,
    pub csrf: CsrfGuard,
    pub login_limiter: RateLimitGuard,
    pub password_reset_limiter: RateLimitGuard,
    pub clock: SharedClock,
}

impl AppState {
    /// Wire the primitives from configuration. Fails on unusable secrets or
    /// lifetimes.
    pub fn new(
        config: TrustConfig,
        stores: Stores,
        email: Arc<dyn EmailProvider>,
        clock: SharedClock,
    ) -> Result<Self, AppError> {
        let tokens = TokenService::new(
            config.jwt.access_secret.expose_secret().as_bytes(),
            config.jwt.refresh_secret.expose_secret().as_bytes(),
            config.access_token_ttl(),
            config.session_ttl(),
            clock.clone(),
        )
        .map_err(AppError::ConfigError)?;
        let csrf = CsrfGuard::new(config.csrf.secret.expose_secret().as_bytes())
            .map_err(AppError::ConfigError)?;

        let sessions = SessionManager::new(
            stores.sessions.clone(),
            config.session_ttl(),
            clock.clone(),
        );
        let resets = PasswordResetManager::new(
            stores.reset_tokens.clone(),
            config.password_reset_ttl(),
            clock.clone(),
        );
        let audit = AuditRecorder::new(stores.audit.clone(), clock.clone());

        let login_limiter = RateLimitGuard::new(
            RateLimiter::shared(
                RateLimitPolicy {
                    ceiling: config.rate_limit.login_attempts,
                    window_seconds: config.rate_limit.login_window_seconds,
                },
                clock.clone(),
            ),
            audit.clone(),
            "login",
        );
        let password_reset_limiter = RateLimitGuard::new(
            RateLimiter::shared(
                RateLimitPolicy {
                    ceiling: config.rate_limit.password_reset_attempts,
                    window_seconds: config.rate_limit.password_reset_window_seconds,
                },
                clock.clone(),
            ),
            audit.clone(),
            "password_reset",
        );

        let auth_service = AuthService::new(
            stores.users.clone(),
            tokens,
            sessions,
            resets,
            audit,
            email,
            config.password_reset.public_base_url.clone(),
            clock.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            stores,
            auth_service,
            csrf,
            login_limiter,
            password_reset_limiter,
            clock,
        })
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Throttle runs before the CSRF check so rejected attempts still count.
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::csrf_middleware,
        ))
        .layer(from_fn_with_state(
            state.login_limiter.clone(),
            middleware::rate_limit_middleware,
        ));

    let reset_request_route = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::csrf_middleware,
        ))
        .layer(from_fn_with_state(
            state.password_reset_limiter.clone(),
            middleware::rate_limit_middleware,
        ));

    let session_routes = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::csrf_middleware,
        ));

    let authenticated_routes = Router::new()
        .route("/auth/password/change", post(handlers::auth::change_password))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::csrf_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/auth/admin/users/:user_id/sessions",
            delete(handlers::admin::revoke_user_sessions),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::csrf_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::require_admin))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/auth/csrf", get(handlers::auth::issue_csrf_token))
        .route("/auth/verify", get(handlers::auth::verify))
        .route(
            "/auth/password-reset/:token",
            get(handlers::auth::reset_token_status),
        )
        .merge(login_route)
        .merge(reset_request_route)
        .merge(session_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(Extension(TrustedProxies::new(
            state.config.security.trusted_proxies.clone(),
        )))
        .layer(cors_layer(&state.config));

    Ok(app)
}

fn cors_layer(config: &TrustConfig) -> CorsLayer {
    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER),
        ])
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.stores.users.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "credential_store": "up"
        }
    })))
}
