//! Shared setup for trust-service integration tests.
//!
//! Every test app runs on the in-memory store, a manual clock and a
//! recording email provider, so no external service is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{TimeZone, Utc};
use service_core::config::Config;
use service_core::utils::ManualClock;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::util::ServiceExt;
use trust_service::{
    build_router,
    config::TrustConfig,
    models::{Role, User},
    services::{MockEmailService, CSRF_COOKIE, CSRF_HEADER},
    store::{AuditSink, MemoryStore, Stores, UserStore},
    utils::{hash_password, Password},
    AppState,
};

pub const USER_PASSWORD: &str = "CorrectHorse1!";
pub const ADMIN_PASSWORD: &str = "AdminBattery9!";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub email: Arc<MockEmailService>,
    pub user: User,
    pub admin: User,
}

/// Credentials carried between requests, like a browser cookie jar.
#[derive(Debug, Clone, Default)]
pub struct Client {
    /// Peer address of the connection.
    pub ip: String,
    /// `X-Forwarded-For` value sent with every request, if any.
    pub forwarded_for: Option<String>,
    pub cookies: HashMap<String, String>,
}

impl Client {
    pub fn new(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            forwarded_for: None,
            cookies: HashMap::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Apply `Set-Cookie` headers; a zero max-age removes the cookie.
    pub fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let removed = raw.to_ascii_lowercase().contains("max-age=0") || value.is_empty();
            if removed {
                self.cookies.remove(name.trim());
            } else {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let peer: IpAddr = self.ip.parse().unwrap();
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::new(peer, 51000)))
            .header(header::USER_AGENT, "integration-test/1.0");
        if let Some(forwarded) = &self.forwarded_for {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        if let Some(cookies) = self.cookie_header() {
            builder = builder.header(header::COOKIE, cookies);
        }
        if let Some(csrf) = self.cookie(CSRF_COOKIE) {
            builder = builder.header(CSRF_HEADER, csrf);
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}

pub fn test_config(overrides: &[(&str, &str)]) -> TrustConfig {
    let mut vars: HashMap<String, String> = [
        ("ENVIRONMENT", "dev"),
        ("LOG_LEVEL", "error"),
        ("JWT_ACCESS_SECRET", "test-access-secret"),
        ("JWT_REFRESH_SECRET", "test-refresh-secret"),
        ("CSRF_SECRET", "test-csrf-secret"),
        ("PUBLIC_BASE_URL", "https://admin.school.example"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    TrustConfig::from_vars(Config::default(), move |key| vars.get(key).cloned())
        .expect("test config")
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(&[], None, MockEmailService::new()).await
}

/// Build an app with config overrides, an optional replacement audit sink
/// and a chosen email provider.
pub async fn spawn_app_with(
    overrides: &[(&str, &str)],
    audit_sink: Option<Arc<dyn AuditSink>>,
    email: MockEmailService,
) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
    ));
    let email = Arc::new(email);

    let user = seed_user(
        &store,
        "jdoe",
        "jdoe@school.example",
        USER_PASSWORD,
        Role::Teacher,
    )
    .await;
    let admin = seed_user(
        &store,
        "principal",
        "principal@school.example",
        ADMIN_PASSWORD,
        Role::Admin,
    )
    .await;

    let mut stores = Stores::memory(store.clone());
    if let Some(sink) = audit_sink {
        stores = stores.with_audit_sink(sink);
    }

    let state = AppState::new(test_config(overrides), stores, email.clone(), clock.clone())
        .expect("app state");
    let router = build_router(state.clone()).await.expect("router");

    TestApp {
        router,
        state,
        store,
        clock,
        email,
        user,
        admin,
    }
}

pub async fn seed_user(
    store: &MemoryStore,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> User {
    let hash = hash_password(&Password::new(password.to_string())).unwrap();
    let user = User::new(
        username.to_string(),
        email.to_string(),
        hash.into_string(),
        Some(username.to_uppercase()),
        role,
    );
    store.insert_user(&user).await.unwrap();
    user
}

impl TestApp {
    pub async fn send(&self, client: &mut Client, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        client.absorb(response.headers());
        response
    }

    /// Build a request from the client's credentials and send it.
    pub async fn call(
        &self,
        client: &mut Client,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Response {
        let request = client.request(method, uri, body);
        self.send(client, request).await
    }

    /// GET /auth/csrf so later mutating requests carry the token.
    pub async fn prime_csrf(&self, client: &mut Client) {
        let response = self.call(client, "GET", "/auth/csrf", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(client.cookie(CSRF_COOKIE).is_some());
    }

    pub async fn login(&self, client: &mut Client, username: &str, password: &str) -> Response {
        let request = client.request(
            "POST",
            "/auth/login",
            Some(serde_json::json!({ "username": username, "password": password })),
        );
        self.send(client, request).await
    }

    /// CSRF + successful login as the seeded teacher.
    pub async fn logged_in_user(&self, ip: &str) -> Client {
        let mut client = Client::new(ip);
        self.prime_csrf(&mut client).await;
        let response = self.login(&mut client, "jdoe", USER_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        client
    }

    pub async fn logged_in_admin(&self, ip: &str) -> Client {
        let mut client = Client::new(ip);
        self.prime_csrf(&mut client).await;
        let response = self.login(&mut client, "principal", ADMIN_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        client
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Detached audit writes land on another task; poll until `count` events
/// are stored.
pub async fn wait_for_audit_events(store: &MemoryStore, count: usize) {
    for _ in 0..100 {
        if store.audit_events().await.len() >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("expected at least {} audit events", count);
}
