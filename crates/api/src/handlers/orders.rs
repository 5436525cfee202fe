//! Handlers for checkout and capture.
//!
//! Checkout is rate limited per user email: a client may start a new
//! checkout only once per configured interval (after its burst).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use coursehub_payments::ProviderKind;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/orders/paypal
pub async fn checkout_paypal(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    checkout(auth, state, ProviderKind::Paypal).await
}

/// POST /api/v1/orders/stripe
pub async fn checkout_stripe(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    checkout(auth, state, ProviderKind::Stripe).await
}

async fn checkout(
    auth: AuthUser,
    state: AppState,
    provider: ProviderKind,
) -> AppResult<impl IntoResponse> {
    if !state.checkout_limiter.check(&auth.email) {
        return Err(AppError::RateLimited);
    }

    let checkout = state.pipeline.checkout(auth.user_id, provider).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: checkout })))
}

/// POST /api/v1/orders/paypal/{provider_id}/capture
///
/// Capture an approved PayPal order and fulfil it. Capturing an order that
/// is already fulfilled returns success without charging again.
pub async fn capture_paypal(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let fulfillment = state.pipeline.capture(auth.user_id, &provider_id).await?;
    Ok(Json(DataResponse { data: fulfillment }))
}
