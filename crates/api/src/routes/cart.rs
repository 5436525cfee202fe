use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::cart;
use crate::state::AppState;

/// Cart routes mounted at `/cart`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show_cart).delete(cart::delete_cart))
        .route("/items", post(cart::add_item))
        .route("/items/{course_id}", delete(cart::remove_item))
}
