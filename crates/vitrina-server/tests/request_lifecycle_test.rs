//! Integration tests for request submission and the fulfillment lifecycle

use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::*;

#[tokio::test]
async fn submission_merges_duplicate_lines_and_totals() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;

    let payload = request_payload(
        "req-key-000001",
        json!([
            {"product_id": P1, "quantity": 2, "unit_price_cents": 1000},
            {"product_id": P1, "quantity": 3, "unit_price_cents": 1000},
        ]),
    );
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_body(response).await;
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["quantity"], 5);
    assert_eq!(body["items"][0]["product_name"], "Hoodie");
    assert_eq!(body["total_amount_cents"], 5000);

    // the submission event commits in the same transaction
    let correlated: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM analytics_events WHERE event_type = 'request_submitted' AND request_id = ?",
    )
    .bind(body["id"].as_str().unwrap())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(correlated, 1);
}

#[tokio::test]
async fn unknown_price_nulls_the_total() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;
    seed_product(&pool, P2, "Limited Cap", None).await;

    let payload = request_payload(
        "req-key-000002",
        json!([
            {"product_id": P1, "quantity": 2},
            {"product_id": P2, "quantity": 1},
        ]),
    );
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_body(response).await;
    assert_eq!(body["total_amount_cents"], serde_json::Value::Null);
    // P1 snapshots its catalog price; P2 has none anywhere
    assert_eq!(body["items"][0]["unit_price_cents"], 1000);
    assert_eq!(body["items"][1]["unit_price_cents"], serde_json::Value::Null);
}

#[tokio::test]
async fn disagreeing_unit_prices_null_the_merged_item() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", None).await;

    let payload = request_payload(
        "req-key-000003",
        json!([
            {"product_id": P1, "quantity": 1, "unit_price_cents": 1000},
            {"product_id": P1, "quantity": 1, "unit_price_cents": 1200},
        ]),
    );
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_body(response).await;
    assert_eq!(body["items"][0]["unit_price_cents"], serde_json::Value::Null);
    assert_eq!(body["total_amount_cents"], serde_json::Value::Null);
}

#[tokio::test]
async fn duplicate_submissions_return_the_original_request() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;

    let payload = request_payload("req-key-000004", json!([{"product_id": P1, "quantity": 1}]));
    let first = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = response_body(first).await;

    let second = app
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = response_body(second).await;
    assert_eq!(first["id"], second["id"]);

    assert_eq!(count_rows(&pool, "product_requests").await, 1);
    assert_eq!(count_rows(&pool, "product_request_items").await, 1);
}

#[tokio::test]
async fn missing_products_are_listed_together() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;

    let payload = request_payload(
        "req-key-000005",
        json!([
            {"product_id": P1, "quantity": 1},
            {"product_id": P2, "quantity": 1},
            {"product_id": C1, "quantity": 1},
        ]),
    );
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_body(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains(P2));
    assert!(message.contains(C1));
    assert_eq!(count_rows(&pool, "product_requests").await, 0);
}

async fn submit_request_for(
    app: &axum::Router,
    idempotency_key: &str,
) -> serde_json::Value {
    let payload = request_payload(idempotency_key, json!([{"product_id": P1, "quantity": 1}]));
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/track/requests",
            &[("x-events-key", FRONT_KEY)],
            &payload,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response_body(response).await
}

async fn patch_status(
    app: &axum::Router,
    token: &str,
    request_id: &str,
    body: serde_json::Value,
) -> axum::http::Response<axum::body::Body> {
    app.clone()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/requests/{request_id}/status"),
            &[("authorization", &bearer(token))],
            &body,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn lifecycle_happy_path_sets_timestamps_and_history() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;
    let token = operator_token();

    let submitted = submit_request_for(&app, "req-key-000006").await;
    let id = submitted["id"].as_str().unwrap();

    let response = patch_status(&app, &token, id, json!({"status": "paid"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let paid = response_body(response).await;
    assert_eq!(paid["status"], "paid");
    assert!(paid["contacted_at"].is_string());
    assert!(paid["paid_at"].is_string());
    assert_eq!(paid["status_updated_by"], "op-1");

    // the storage encoding keeps the legacy value while the API stays canonical
    let stored: String = sqlx::query_scalar("SELECT status FROM product_requests WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, "contacted");

    let response = patch_status(&app, &token, id, json!({"status": "fulfilled"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let fulfilled = response_body(response).await;
    assert!(fulfilled["delivered_at"].is_string());
    assert!(fulfilled["resolved_at"].is_string());

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/api/requests/{id}"),
            &[("authorization", &bearer(&token))],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = response_body(response).await;
    let history = fetched["status_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["previous_status"], "submitted");
    assert_eq!(history[0]["new_status"], "paid");
    assert_eq!(history[1]["new_status"], "fulfilled");

    // terminal state rejects further transitions
    let response = patch_status(&app, &token, id, json!({"status": "paid"})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // ...except the idempotent no-op, which appends no history
    let response = patch_status(&app, &token, id, json!({"status": "fulfilled"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(count_rows(&pool, "product_request_status_history").await, 2);
}

#[tokio::test]
async fn declines_require_a_reason_and_the_paid_state() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;
    let token = operator_token();

    let submitted = submit_request_for(&app, "req-key-000007").await;
    let id = submitted["id"].as_str().unwrap();

    // no reason: rejected before any state change
    let response = patch_status(&app, &token, id, json!({"status": "declined_customer"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // declines only branch off the paid state
    let response = patch_status(
        &app,
        &token,
        id,
        json!({"status": "declined_customer", "reason": "changed mind"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = patch_status(&app, &token, id, json!({"status": "paid"})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = patch_status(
        &app,
        &token,
        id,
        json!({"status": "declined_customer", "reason": "changed mind"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let declined = response_body(response).await;
    assert_eq!(declined["status"], "declined_customer");
    assert_eq!(declined["status_reason"], "changed mind");
    assert!(declined["resolved_at"].is_string());
    assert_eq!(declined["delivered_at"], serde_json::Value::Null);
}

#[tokio::test]
async fn reopening_is_feature_gated() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;
    let token = operator_token();

    let submitted = submit_request_for(&app, "req-key-000008").await;
    let id = submitted["id"].as_str().unwrap();
    patch_status(&app, &token, id, json!({"status": "paid"})).await;

    // flag off: reopening is a conflict
    let response = patch_status(
        &app,
        &token,
        id,
        json!({"status": "submitted", "reason": "customer changed the order"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // flag on: allowed, requires a reason, clears derived timestamps
    let mut config = test_config();
    config.allow_request_reopen = true;
    let (app, pool) = create_test_app_with(config).await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;
    let submitted = submit_request_for(&app, "req-key-000009").await;
    let id = submitted["id"].as_str().unwrap();
    patch_status(&app, &token, id, json!({"status": "paid"})).await;

    let response = patch_status(&app, &token, id, json!({"status": "submitted"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = patch_status(
        &app,
        &token,
        id,
        json!({"status": "submitted", "reason": "customer changed the order"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let reopened = response_body(response).await;
    assert_eq!(reopened["status"], "submitted");
    assert_eq!(reopened["contacted_at"], serde_json::Value::Null);
    assert_eq!(reopened["paid_at"], serde_json::Value::Null);
    assert_eq!(reopened["status_reason"], "customer changed the order");
}

#[tokio::test]
async fn transitions_are_audited_with_before_and_after_snapshots() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;
    let token = operator_token();

    let submitted = submit_request_for(&app, "req-key-000010").await;
    let id = submitted["id"].as_str().unwrap();
    patch_status(&app, &token, id, json!({"status": "paid"})).await;

    let row: (String, Option<String>, Option<String>, Option<String>) = sqlx::query_as(
        "SELECT action, actor_id, before_state, after_state FROM audit_log
         WHERE entity_type = 'product_request' AND entity_id = ? AND action = 'update_status'",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "update_status");
    assert_eq!(row.1.as_deref(), Some("op-1"));
    let before: serde_json::Value = serde_json::from_str(&row.2.unwrap()).unwrap();
    let after: serde_json::Value = serde_json::from_str(&row.3.unwrap()).unwrap();
    assert_eq!(before["status"], "submitted");
    assert_eq!(after["status"], "paid");
}

#[tokio::test]
async fn operator_surface_requires_a_token() {
    let (app, pool) = create_test_app().await;
    seed_product(&pool, P1, "Hoodie", Some(1000)).await;

    let submitted = submit_request_for(&app, "req-key-000011").await;
    let id = submitted["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/requests/{id}/status"),
            &[],
            &json!({"status": "paid"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get_request(&format!("/api/requests/{id}"), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
