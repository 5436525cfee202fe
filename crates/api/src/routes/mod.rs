pub mod cart;
pub mod courses;
pub mod health;
pub mod orders;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /cart                                GET show, DELETE flush
/// /cart/items                          POST add item
/// /cart/items/{course_id}              DELETE remove item
///
/// /courses/owned                       GET courses the user bought
/// /courses/{id}                        PATCH versioned update
///
/// /orders/paypal                       POST checkout via PayPal
/// /orders/paypal/{provider_id}/capture POST capture and fulfil
/// /orders/stripe                       POST checkout via Stripe
///
/// /webhooks/stripe                     POST signed Stripe events (no auth)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart::router())
        .nest("/courses", courses::router())
        .nest("/orders", orders::router())
        .nest("/webhooks", webhooks::router())
}
