//! Test utilities
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub use vitrina_server::{app, auth, config::Config, db, state::AppState};

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-testing-only";
pub const FRONT_KEY: &str = "front-secret-key";
pub const MOBILE_KEY: &str = "mobile-secret-key";

pub const P1: &str = "11111111-1111-1111-1111-111111111111";
pub const P2: &str = "22222222-2222-2222-2222-222222222222";
pub const C1: &str = "33333333-3333-3333-3333-333333333333";

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        cors_origins: Vec::new(),
        tracking_allowed_origins: Vec::new(),
        trust_proxy_headers: false,
        trusted_proxy_cidrs: Vec::new(),
        event_rate_limit_requests: 120,
        event_rate_limit_window_seconds: 60,
        public_event_rate_limit_requests: 100,
        public_event_rate_limit_window_seconds: 60,
        public_request_rate_limit_requests: 50,
        public_request_rate_limit_window_seconds: 60,
        events_write_keys: vec![format!("front:{FRONT_KEY}"), MOBILE_KEY.to_string()],
        events_write_key: None,
        events_require_key: true,
        allow_request_reopen: false,
    }
}

/// Create a test application with an in-memory database
pub async fn create_test_app() -> (Router, SqlitePool) {
    create_test_app_with(test_config()).await
}

pub async fn create_test_app_with(config: Config) -> (Router, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    db::migrate(&pool).await.expect("Failed to run migrations");

    let state = Arc::new(AppState::new(pool.clone(), config));
    (app::build_router(state), pool)
}

pub async fn seed_product(pool: &SqlitePool, id: &str, name: &str, price_cents: Option<i64>) {
    sqlx::query(
        "INSERT INTO products (id, name, price_cents, currency, created_at) VALUES (?, ?, ?, 'USD', ?)",
    )
    .bind(id)
    .bind(name)
    .bind(price_cents)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("Failed to seed product");
}

pub async fn seed_catalog(pool: &SqlitePool, id: &str, name: &str) {
    sqlx::query("INSERT INTO catalogs (id, name, created_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("Failed to seed catalog");
}

pub fn operator_token() -> String {
    auth::create_token("op-1", "Test Operator", "admin", TEST_JWT_SECRET).expect("token")
}

/// Build a JSON request. `headers` come on top of content-type.
pub fn json_request(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: &Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Minimal valid public event payload
pub fn event_payload(idempotency_key: &str, product_id: &str) -> Value {
    json!({
        "event_type": "click",
        "product_id": product_id,
        "page_path": "/catalog",
        "source": "web",
        "session_id": "session-12345678",
        "visitor_id": "visitor-12345678",
        "idempotency_key": idempotency_key,
    })
}

/// Minimal valid public request payload
pub fn request_payload(idempotency_key: &str, items: Value) -> Value {
    json!({
        "idempotency_key": idempotency_key,
        "session_id": "session-12345678",
        "visitor_id": "visitor-12345678",
        "page_path": "/checkout",
        "source": "web",
        "customer_name": "Test Customer",
        "items": items,
    })
}

/// Extract JSON body from response
pub async fn response_body(response: Response<Body>) -> Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar(&sql)
        .fetch_one(pool)
        .await
        .expect("count query")
}
