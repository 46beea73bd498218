//! Services layer for the trust service.
//!
//! The six primitives of the session and trust core plus the flow
//! orchestrator that composes them.

mod audit;
mod auth;
mod bootstrap;
mod csrf;
mod email;
pub mod error;
mod jwt;
pub mod maintenance;
mod password_reset;
mod session;

pub use audit::AuditRecorder;
pub use auth::{AuthService, Authenticated, LoginOutcome, RefreshOutcome, RequestContext};
pub use bootstrap::ensure_bootstrap_admin;
pub use csrf::{CsrfGuard, CsrfToken, CSRF_COOKIE, CSRF_HEADER};
pub use email::{EmailProvider, MockEmailService, SentEmail, SmtpEmailService};
pub use error::ServiceError;
pub use jwt::{
    AccessTokenClaims, RefreshTokenClaims, TokenError, TokenPair, TokenService, TokenSubject,
    REFRESH_TOKEN_KIND,
};
pub use maintenance::{run_maintenance_pass, spawn_maintenance, MaintenanceReport};
pub use password_reset::PasswordResetManager;
pub use session::SessionManager;
