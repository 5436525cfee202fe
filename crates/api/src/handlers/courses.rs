//! Handlers for course endpoints.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use coursehub_core::course::validate_course_fields;
use coursehub_core::error::CoreError;
use coursehub_core::types::DbId;
use coursehub_db::models::course::UpdateCourse;
use coursehub_db::repositories::CourseRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/courses/owned
pub async fn list_owned(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let courses = CourseRepo::list_owned(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: courses }))
}

/// PATCH /api/v1/courses/{id}
///
/// Read, patch in memory, validate, and write back conditioned on the
/// version that was read. A `version` in the body must match the stored
/// one. Concurrent edits surface as 409.
pub async fn update_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<DbId>,
    Json(patch): Json<UpdateCourse>,
) -> AppResult<impl IntoResponse> {
    let mut course = CourseRepo::find_by_id(&state.pool, course_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Course",
            id: course_id,
        }))?;

    if patch.version.is_some_and(|v| v != course.version) {
        return Err(CoreError::VersionConflict {
            entity: "Course",
            id: course_id,
        }
        .into());
    }

    course.apply(&patch);
    validate_course_fields(&course.fields())?;

    let updated = CourseRepo::update(&state.pool, &course).await?;
    tracing::info!(course_id, user_id = auth.user_id, version = updated.version, "Course updated");

    Ok(Json(DataResponse { data: updated }))
}
