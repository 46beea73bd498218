//! Credential cookies. All are HTTP-only, `SameSite=Strict`, path `/`, and
//! `Secure` in production.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use uuid::Uuid;

pub use crate::services::CSRF_COOKIE;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const SESSION_COOKIE: &str = "session_id";

pub fn credential_cookie(
    name: &'static str,
    value: String,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .build()
}

/// Replace the cookie with an empty one that expires immediately.
pub fn cleared_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    credential_cookie(name, String::new(), Duration::zero(), secure)
}

/// Session id from the `session_id` cookie; unparsable values count as absent.
pub fn session_id_from(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

pub fn clear_credentials(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(cleared_cookie(ACCESS_TOKEN_COOKIE, secure))
        .add(cleared_cookie(SESSION_COOKIE, secure))
        .add(cleared_cookie(CSRF_COOKIE, secure))
}
