//! End-to-end tests of checkout (phase A) and fulfillment (phase B).

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use common::{
    body_json, get, login, patch_json, post, post_json, relaxed_rate_limit, seed_course,
    seed_user, TestApp, UNREACHABLE_STRIPE_URL,
};
use coursehub_api::config::RateLimitConfig;
use coursehub_api::engine::{Fulfillment, PipelineError};
use coursehub_db::models::order::{CreateOrder, CreateOrderItem};
use coursehub_db::models::status::OrderStatus;
use coursehub_db::repositories::{CartRepo, OrderRepo};
use coursehub_payments::ProviderKind;
use serde_json::{json, Value};
use sqlx::PgPool;

async fn add_to_cart(app: &TestApp, token: &str, course_id: i64) {
    let response =
        post_json(app.app(), "/api/v1/cart/items", token, json!({ "course_id": course_id })).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn checkout_paypal(app: &TestApp, token: &str) -> Value {
    let response = post(app.app(), "/api/v1/orders/paypal", token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

async fn capture(app: &TestApp, token: &str, provider_id: &str) -> (StatusCode, Value) {
    let uri = format!("/api/v1/orders/paypal/{provider_id}/capture");
    let response = post(app.app(), &uri, token).await;
    let status = response.status();
    (status, body_json(response).await)
}

#[sqlx::test(migrations = "../db/migrations")]
async fn paypal_purchase_captures_prices_and_grants_ownership(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    let go = seed_course(&pool, "Go", 3000).await;
    add_to_cart(&app, &token, rust.id).await;
    add_to_cart(&app, &token, go.id).await;

    let checkout = checkout_paypal(&app, &token).await;
    assert_eq!(checkout["provider"], "paypal");
    assert_eq!(checkout["total"], 8000);
    assert!(checkout["redirect_url"].as_str().unwrap().contains("approve"));
    let provider_id = checkout["provider_id"].as_str().unwrap().to_string();
    let order_id = checkout["order_id"].as_i64().unwrap();

    // The cart survives until payment is confirmed.
    assert_eq!(CartRepo::items(&pool, user_id).await.unwrap().len(), 2);

    // Catalog edits after checkout do not touch the order.
    let edit = patch_json(
        app.app(),
        &format!("/api/v1/courses/{}", rust.id),
        &token,
        json!({ "price": 9900 }),
    )
    .await;
    assert_eq!(edit.status(), StatusCode::OK);

    let (status, body) = capture(&app, &token, &provider_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "fulfilled");
    assert_eq!(body["data"]["order_id"], order_id);

    let order = OrderRepo::find_by_id(&pool, order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), Some(OrderStatus::Success));
    let mut prices: Vec<i64> = OrderRepo::items(&pool, order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.price)
        .collect();
    prices.sort_unstable();
    assert_eq!(prices, vec![3000, 5000]);
    assert_eq!(OrderRepo::total(&pool, order_id).await.unwrap(), 8000);

    let cart = body_json(get(app.app(), "/api/v1/cart", Some(&token)).await).await;
    assert_eq!(cart["data"]["items"], json!([]));

    let owned = body_json(get(app.app(), "/api/v1/courses/owned", Some(&token)).await).await;
    let owned_ids: Vec<i64> = owned["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(owned_ids, vec![rust.id, go.id]);

    app.drain().await;
    let sent = app.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ann@example.com");
    assert_eq!(sent[0].1.total, 8000);
    assert_eq!(sent[0].1.course_names, vec!["Rust".to_string(), "Go".to_string()]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn second_capture_is_a_no_op(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;
    let checkout = checkout_paypal(&app, &token).await;
    let provider_id = checkout["provider_id"].as_str().unwrap();

    let (first, _) = capture(&app, &token, provider_id).await;
    let (second, body) = capture(&app, &token, provider_id).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "already_fulfilled");
    assert_eq!(app.paypal.captures(), 1);

    app.drain().await;
    assert_eq!(app.mailer.sent.lock().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn checkout_of_empty_cart_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_, token) = login(&pool, "ann@example.com").await;

    let response = post(app.app(), "/api/v1/orders/paypal", &token).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "EMPTY_CART");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn second_checkout_within_interval_is_rate_limited(pool: PgPool) {
    let limit = RateLimitConfig {
        burst: 1,
        interval: Duration::from_secs(60),
        expiry: Duration::from_secs(300),
    };
    let app = common::build_test_app_with(pool.clone(), limit, "http://127.0.0.1:9");
    let (_, ann) = login(&pool, "ann@example.com").await;
    let (_, bob) = login(&pool, "bob@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &ann, rust.id).await;
    add_to_cart(&app, &bob, rust.id).await;

    checkout_paypal(&app, &ann).await;
    let limited = post(app.app(), "/api/v1/orders/paypal", &ann).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(limited).await["code"], "RATE_LIMITED");

    // Other users have their own bucket.
    checkout_paypal(&app, &bob).await;
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unconfirmed_capture_leaves_order_pending(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;
    let checkout = checkout_paypal(&app, &token).await;
    let provider_id = checkout["provider_id"].as_str().unwrap();

    app.paypal.set_capture_status("PAYER_ACTION_REQUIRED");
    let (status, body) = capture(&app, &token, provider_id).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_NOT_CONFIRMED");
    let order = OrderRepo::find_by_provider_id(&pool, provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), Some(OrderStatus::Pending));
    assert_eq!(CartRepo::items(&pool, user_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn capture_of_foreign_or_unknown_order_is_404(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_, ann) = login(&pool, "ann@example.com").await;
    let (_, bob) = login(&pool, "bob@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &ann, rust.id).await;
    let checkout = checkout_paypal(&app, &ann).await;
    let provider_id = checkout["provider_id"].as_str().unwrap();

    let (foreign, body) = capture(&app, &bob, provider_id).await;
    assert_eq!(foreign, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNKNOWN_ORDER");

    let (unknown, _) = capture(&app, &ann, "PAYPAL-404").await;
    assert_eq!(unknown, StatusCode::NOT_FOUND);
    assert_eq!(app.paypal.captures(), 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn expired_order_is_not_fulfilled(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;
    let checkout = checkout_paypal(&app, &token).await;
    let provider_id = checkout["provider_id"].as_str().unwrap();

    let expired = OrderRepo::expire_stale(&pool, chrono::Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let (status, body) = capture(&app, &token, provider_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(app.paypal.captures(), 0);

    // A confirmation arriving anyway is refused and flagged.
    let result = app.state.pipeline.fulfill(provider_id).await;
    assert_matches!(result, Err(PipelineError::OrderExpired { user_id: u, .. }) if u == user_id);
    assert_eq!(CartRepo::items(&pool, user_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn fulfill_applies_exactly_once(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;
    let checkout = app
        .state
        .pipeline
        .checkout(user_id, ProviderKind::Paypal)
        .await
        .unwrap();

    let pipeline = &app.state.pipeline;
    let (a, b) = tokio::join!(
        pipeline.fulfill(&checkout.provider_id),
        pipeline.fulfill(&checkout.provider_id)
    );
    let mut outcomes = [a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, Fulfillment::AlreadyFulfilled { .. }));

    assert_eq!(
        outcomes,
        [
            Fulfillment::Fulfilled { order_id: checkout.order_id },
            Fulfillment::AlreadyFulfilled { order_id: checkout.order_id },
        ]
    );
    app.drain().await;
    assert_eq!(app.mailer.sent.lock().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn fulfill_of_unknown_payment_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool);

    let result = app.state.pipeline.fulfill("never-created").await;

    assert_matches!(result, Err(PipelineError::UnknownOrder { provider_id }) if provider_id == "never-created");
}

/// An app whose provider calls give up after one second and whose
/// requests give up after two.
fn app_with_short_timeouts(pool: PgPool) -> TestApp {
    let mut config = common::test_config(relaxed_rate_limit(), UNREACHABLE_STRIPE_URL);
    config.provider_timeout_secs = 1;
    config.request_timeout_secs = 2;
    common::build_test_app_from(pool, config)
}

async fn order_count(pool: &PgPool, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../db/migrations")]
async fn fulfillment_finishes_after_request_deadline(pool: PgPool) {
    let app = app_with_short_timeouts(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;
    let checkout = checkout_paypal(&app, &token).await;
    let provider_id = checkout["provider_id"].as_str().unwrap().to_string();

    // Hold the order row so the local commit cannot finish before the
    // request deadline.
    let mut lock = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM orders WHERE provider_id = $1 FOR UPDATE")
        .bind(&provider_id)
        .execute(&mut *lock)
        .await
        .unwrap();

    let (status, _) = capture(&app, &token, &provider_id).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(app.paypal.captures(), 1);

    lock.commit().await.unwrap();

    let mut fulfilled = false;
    for _ in 0..50 {
        let order = OrderRepo::find_by_provider_id(&pool, &provider_id)
            .await
            .unwrap()
            .unwrap();
        if order.status() == Some(OrderStatus::Success) {
            fulfilled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(fulfilled, "captured order was never fulfilled");
    assert!(CartRepo::items(&pool, user_id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn order_insert_failure_after_payment_is_orphaned(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;

    // The fake hands out PAYPAL-1 first; an order already holds that id.
    OrderRepo::create_with_items(
        &pool,
        &CreateOrder {
            user_id: bob,
            provider_id: "PAYPAL-1".to_string(),
            items: vec![CreateOrderItem {
                course_id: rust.id,
                price: 5000,
            }],
        },
    )
    .await
    .unwrap();

    let result = app
        .state
        .pipeline
        .checkout(user_id, ProviderKind::Paypal)
        .await;

    assert_matches!(
        result,
        Err(PipelineError::OrphanedPayment { provider_id, user_id: u, amount: 5000, .. })
            if provider_id == "PAYPAL-1" && u == user_id
    );
    assert_eq!(order_count(&pool, user_id).await, 0);
    assert_eq!(CartRepo::items(&pool, user_id).await.unwrap().len(), 1);

    let response = post(app.app(), "/api/v1/orders/paypal", &token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_commit_after_capture_is_not_fulfilled(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;
    let checkout = checkout_paypal(&app, &token).await;
    let provider_id = checkout["provider_id"].as_str().unwrap().to_string();

    sqlx::query(
        "CREATE FUNCTION refuse_cart_delete() RETURNS trigger AS $$
         BEGIN RAISE EXCEPTION 'carts are read-only'; END
         $$ LANGUAGE plpgsql",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER refuse_cart_delete BEFORE DELETE ON carts
         FOR EACH STATEMENT EXECUTE FUNCTION refuse_cart_delete()",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = app.state.pipeline.capture(user_id, &provider_id).await;
    assert_matches!(
        result,
        Err(PipelineError::NotFulfilled { user_id: Some(u), amount: Some(5000), .. }) if u == user_id
    );

    let (status, body) = capture(&app, &token, &provider_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");

    let order = OrderRepo::find_by_provider_id(&pool, &provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), Some(OrderStatus::Pending));
    assert_eq!(CartRepo::items(&pool, user_id).await.unwrap().len(), 1);
    assert!(app.mailer.sent.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn slow_provider_times_out_without_local_changes(pool: PgPool) {
    let app = app_with_short_timeouts(pool.clone());
    let (user_id, token) = login(&pool, "ann@example.com").await;
    let rust = seed_course(&pool, "Rust", 5000).await;
    add_to_cart(&app, &token, rust.id).await;

    app.paypal.set_delay(Duration::from_millis(1500));
    let response = post(app.app(), "/api/v1/orders/paypal", &token).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["code"], "PROVIDER_TIMEOUT");
    assert_eq!(order_count(&pool, user_id).await, 0);

    app.paypal.set_delay(Duration::ZERO);
    let checkout = checkout_paypal(&app, &token).await;
    let provider_id = checkout["provider_id"].as_str().unwrap().to_string();

    app.paypal.set_delay(Duration::from_millis(1500));
    let (status, body) = capture(&app, &token, &provider_id).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "PROVIDER_TIMEOUT");

    let order = OrderRepo::find_by_provider_id(&pool, &provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), Some(OrderStatus::Pending));
    assert_eq!(CartRepo::items(&pool, user_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unreadable_order_after_confirmation_is_not_fulfilled(pool: PgPool) {
    let app = common::build_test_app(pool.clone());

    sqlx::query("ALTER TABLE orders RENAME TO orders_offline")
        .execute(&pool)
        .await
        .unwrap();

    let result = app.state.pipeline.fulfill("PAYPAL-7").await;

    assert_matches!(
        result,
        Err(PipelineError::NotFulfilled { provider_id, user_id: None, amount: None, .. })
            if provider_id == "PAYPAL-7"
    );
}
