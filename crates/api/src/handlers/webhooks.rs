//! Handler for Stripe webhook deliveries.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/v1/webhooks/stripe
///
/// The raw body is verified against the `Stripe-Signature` header before it
/// is parsed. Authentic events that need no action are acknowledged with
/// 200 so the provider stops retrying them.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".into()))?;

    let outcome = state.pipeline.handle_webhook(&body, signature).await?;
    Ok(Json(DataResponse { data: outcome }))
}
