use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use diesel_async::{AsyncPgConnection, pooled_connection::AsyncDieselConnectionManager};
use serde_json::Value;
use shopfront_service::{
    app,
    core::{
        app_state::AppState,
        auth::{AuthUser, issue_token},
        config::{AppConfig, AuthConfig, DatabaseConfig, GatewayUrls, ServerConfig},
        db::DbPool,
    },
    enums::UserRole,
};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

/// An app whose pool points nowhere. Only paths that never reach the
/// database are exercised here.
fn test_app() -> Router {
    let database_url = "postgres://nobody@127.0.0.1:1/none";
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool: DbPool = DbPool::builder()
        .connection_timeout(Duration::from_millis(200))
        .build_unchecked(manager);

    let config = AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            url: database_url.into(),
        },
        auth: AuthConfig {
            secret: SECRET.into(),
            token_ttl: Duration::from_secs(60),
        },
        gateways: GatewayUrls::default(),
        settings_cache_ttl: Duration::from_secs(60),
        domain_name: "http://shop.test".into(),
        media_dir: std::env::temp_dir().display().to_string(),
        super_admin: None,
    };
    app(AppState::new(pool, config)).expect("app builds")
}

fn token_for(role: UserRole, expires_in: i64) -> String {
    issue_token(
        SECRET,
        &AuthUser { id: 7, role },
        Utc::now().timestamp() + expires_in,
    )
    .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn cart_requires_a_session() {
    let response = test_app()
        .oneshot(Request::get("/api/cart").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Authentication required");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let response = test_app()
        .oneshot(
            Request::get("/api/admin/stats")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", token_for(UserRole::Customer, 60)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let response = test_app()
        .oneshot(
            Request::get("/api/admin/orders")
                .header(
                    header::COOKIE,
                    format!("session={}", token_for(UserRole::Admin, -10)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_tokens_are_rejected() {
    let token = token_for(UserRole::Customer, 60).replacen("customer", "super_admin", 1);
    let response = test_app()
        .oneshot(
            Request::get("/api/admin/stats")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn openapi_document_lists_routes_and_bearer_scheme() {
    let response = test_app()
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert_eq!(doc["info"]["title"], "Shopfront API");
    assert!(doc["paths"]["/api/admin/orders"].is_object());
    assert!(doc["paths"]["/api/payments/webhook"]["post"].is_object());
    assert!(doc["paths"]["/api/products/{identifier}"]["get"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearerAuth"].is_object());
}

#[tokio::test]
async fn gateway_return_without_reference_redirects_home() {
    let response = test_app()
        .oneshot(
            Request::get("/payments/verify?provider=paystack")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/?status=error&message=Payment+reference+missing."
    );
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let response = test_app()
        .oneshot(
            Request::post("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session=;"));
    assert!(cookie.contains("Max-Age=0"));
}
