pub mod auth;
pub mod context;
pub mod csrf;
pub mod rate_limit;

pub use auth::{auth_middleware, require_admin, AuthUser};
pub use csrf::csrf_middleware;
pub use rate_limit::{rate_limit_middleware, RateLimitGuard};
