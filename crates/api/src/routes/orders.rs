use axum::routing::post;
use axum::Router;

use crate::handlers::orders;
use crate::state::AppState;

/// Checkout routes mounted at `/orders`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/paypal", post(orders::checkout_paypal))
        .route("/paypal/{provider_id}/capture", post(orders::capture_paypal))
        .route("/stripe", post(orders::checkout_stripe))
}
