#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use coursehub_api::auth::jwt::{generate_access_token, JwtConfig};
use coursehub_api::background::TaskExecutor;
use coursehub_api::config::{RateLimitConfig, ServerConfig};
use coursehub_api::engine::Pipeline;
use coursehub_api::rate_limit::RateLimiter;
use coursehub_api::router::build_app_router;
use coursehub_api::state::AppState;
use coursehub_core::signature::sign_payload;
use coursehub_core::types::{DbId, MinorUnits};
use coursehub_db::models::course::{Course, CreateCourse};
use coursehub_db::models::user::CreateUser;
use coursehub_db::repositories::{CourseRepo, UserRepo};
use coursehub_events::{EmailError, Mailer, OrderConfirmation};
use coursehub_payments::{
    CaptureOutcome, CaptureProvider, CreatedPayment, LineItem, PaymentProvider, ProviderError,
    ProviderKind, StripeClient, StripeConfig,
};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Stripe endpoint that refuses connections; only webhooks are expected
/// to reach the Stripe client unless a test passes a mock server URL.
pub const UNREACHABLE_STRIPE_URL: &str = "http://127.0.0.1:9";

/// Limits generous enough that ordinary tests never hit them.
pub fn relaxed_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        burst: 100,
        interval: Duration::from_millis(1),
        expiry: Duration::from_secs(300),
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(rate_limit: RateLimitConfig, stripe_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: String::new(),
        cors_origins: vec!["http://localhost:3000".parse().unwrap()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        provider_timeout_secs: 2,
        order_expiry_hours: 48,
        currency: "eur".to_string(),
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        rate_limit,
        paypal: None,
        stripe: Some(StripeConfig {
            api_secret: "sk_test_123".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            success_url: "http://localhost:3000/dashboard".to_string(),
            cancel_url: "http://localhost:3000/cart".to_string(),
            currency: "eur".to_string(),
            base_url: stripe_url.to_string(),
        }),
        email: None,
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// In-memory PayPal stand-in. Capture reports `capture_status`; every
/// call first waits for `delay`.
pub struct FakePaypal {
    created: AtomicUsize,
    captures: AtomicUsize,
    capture_status: Mutex<String>,
    delay: Mutex<Duration>,
}

impl FakePaypal {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
            capture_status: Mutex::new("COMPLETED".to_string()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn set_capture_status(&self, status: &str) {
        *self.capture_status.lock().unwrap() = status.to_string();
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for FakePaypal {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paypal
    }

    async fn create_payment(
        &self,
        items: &[LineItem],
        total: MinorUnits,
    ) -> Result<CreatedPayment, ProviderError> {
        self.wait().await;
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let provider_id = format!("PAYPAL-{n}");
        Ok(CreatedPayment {
            redirect_url: Some(format!("https://paypal.test/approve/{provider_id}")),
            payload: serde_json::json!({ "id": provider_id, "items": items.len(), "total": total }),
            provider_id,
        })
    }
}

#[async_trait]
impl CaptureProvider for FakePaypal {
    async fn capture(&self, _provider_id: &str) -> Result<CaptureOutcome, ProviderError> {
        self.wait().await;
        self.captures.fetch_add(1, Ordering::SeqCst);
        let status = self.capture_status.lock().unwrap().clone();
        Ok(CaptureOutcome {
            confirmed: status == "COMPLETED",
            status,
        })
    }
}

/// Records order confirmations instead of sending them.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<(String, OrderConfirmation)>>,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_activation_token(&self, _token: &str, _address: &str) -> Result<(), EmailError> {
        Ok(())
    }

    async fn send_recovery_token(&self, _token: &str, _address: &str) -> Result<(), EmailError> {
        Ok(())
    }

    async fn send_order_confirmation(
        &self,
        address: &str,
        order: &OrderConfirmation,
    ) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), order.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub paypal: Arc<FakePaypal>,
    pub mailer: Arc<FakeMailer>,
}

impl TestApp {
    /// A fresh router for one request (`oneshot` consumes it).
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Wait for background tasks such as confirmation mail.
    pub async fn drain(&self) {
        self.state
            .pipeline
            .executor()
            .shutdown(Duration::from_secs(5))
            .await
            .unwrap();
    }
}

/// Build the full application with fake PayPal and mail, relaxed rate
/// limits and a Stripe client that cannot reach the network.
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with(pool, relaxed_rate_limit(), UNREACHABLE_STRIPE_URL)
}

/// Build the full application through the same router as `main.rs`.
pub fn build_test_app_with(pool: PgPool, rate_limit: RateLimitConfig, stripe_url: &str) -> TestApp {
    build_test_app_from(pool, test_config(rate_limit, stripe_url))
}

/// Build the full application from an explicit config, e.g. with short
/// timeouts.
pub fn build_test_app_from(pool: PgPool, config: ServerConfig) -> TestApp {
    let paypal = Arc::new(FakePaypal::new());
    let mailer = Arc::new(FakeMailer::default());

    let stripe_config = config.stripe.clone().unwrap();
    let pipeline = Pipeline::new(
        pool.clone(),
        TaskExecutor::new(),
        Duration::from_secs(config.provider_timeout_secs),
        config.currency.clone(),
    )
    .with_paypal(paypal.clone())
    .with_stripe(Arc::new(StripeClient::new(stripe_config)))
    .with_mailer(mailer.clone());

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        checkout_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        paypal,
        mailer,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn seed_user(pool: &PgPool, email: &str) -> DbId {
    UserRepo::create(
        pool,
        &CreateUser {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

pub async fn seed_course(pool: &PgPool, name: &str, price: MinorUnits) -> Course {
    CourseRepo::create(
        pool,
        &CreateCourse {
            name: name.to_string(),
            description: format!("All about {name}"),
            image_url: format!("https://cdn.test/{name}.png"),
            price,
        },
    )
    .await
    .unwrap()
}

/// A user and a bearer token for them.
pub async fn login(pool: &PgPool, email: &str) -> (DbId, String) {
    let user_id = seed_user(pool, email).await;
    (user_id, token_for(user_id, email))
}

pub fn token_for(user_id: DbId, email: &str) -> String {
    let config = JwtConfig {
        secret: JWT_SECRET.to_string(),
        access_token_expiry_mins: 15,
    };
    generate_access_token(user_id, email, &config).unwrap()
}

/// A `stripe-signature` header for `body`, signed now.
pub fn stripe_signature(body: &[u8]) -> String {
    sign_payload(body, WEBHOOK_SECRET, chrono::Utc::now().timestamp()).unwrap()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str, token: Option<&str>) -> Response<Body> {
    send(app, Method::GET, uri, token, None).await
}

pub async fn post_json(app: Router, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn post(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), None).await
}

pub async fn patch_json(app: Router, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(token), Some(body)).await
}

pub async fn delete(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

/// POST a raw webhook body with an optional `stripe-signature` header.
pub async fn post_webhook(app: Router, body: &[u8], signature: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/webhooks/stripe")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    app.oneshot(builder.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap()
}

/// Collect a response body as JSON (`Null` when empty).
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
