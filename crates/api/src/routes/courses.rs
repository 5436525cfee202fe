use axum::routing::{get, patch};
use axum::Router;

use crate::handlers::courses;
use crate::state::AppState;

/// Course routes mounted at `/courses`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/owned", get(courses::list_owned))
        .route("/{id}", patch(courses::update_course))
}
