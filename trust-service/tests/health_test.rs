mod common;

use axum::http::StatusCode;
use common::{body_json, spawn_app, Client};

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let mut client = Client::new("10.6.0.1");

    let response = app.call(&mut client, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "trust-service");
    assert_eq!(body["checks"]["credential_store"], "up");
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = spawn_app().await;
    let mut client = Client::new("10.6.0.2");

    let response = app.call(&mut client, "GET", "/.well-known/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    for path in [
        "/auth/login",
        "/auth/refresh",
        "/auth/verify",
        "/auth/logout",
        "/auth/csrf",
        "/auth/password-reset/request",
        "/auth/password-reset/confirm",
        "/auth/password-reset/{token}",
        "/auth/password/change",
        "/auth/admin/users/{user_id}/sessions",
    ] {
        assert!(body["paths"].get(path).is_some(), "missing {}", path);
    }
}
