//! Handlers for the cart endpoints. All require authentication.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use coursehub_core::types::DbId;
use coursehub_db::models::cart::AddCartItem;

use crate::engine::cart;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/cart
pub async fn show_cart(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let view = cart::show(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// DELETE /api/v1/cart
pub async fn delete_cart(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    cart::delete(&state.pool, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/cart/items
///
/// Adding a course that is already in the cart is a no-op; adding one the
/// user already owns is rejected.
pub async fn add_item(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<AddCartItem>,
) -> AppResult<impl IntoResponse> {
    let view = cart::add_item(&state.pool, auth.user_id, input.course_id).await?;
    tracing::info!(user_id = auth.user_id, course_id = input.course_id, "Course added to cart");
    Ok((StatusCode::CREATED, Json(DataResponse { data: view })))
}

/// DELETE /api/v1/cart/items/{course_id}
pub async fn remove_item(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    cart::remove_item(&state.pool, auth.user_id, course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
