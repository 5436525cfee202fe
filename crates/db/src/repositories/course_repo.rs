//! Repository for the `courses` table.

use coursehub_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::course::{Course, CreateCourse};
use crate::models::status::OrderStatus;
use crate::versioned::{UpdateError, VersionedUpdate};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, description, image_url, price, version, created_at, updated_at";

/// Same columns, qualified for joins against `courses c`.
const JOINED_COLUMNS: &str = "c.id, c.name, c.description, c.image_url, c.price, c.version, \
                              c.created_at, c.updated_at";

/// Provides CRUD operations for courses.
pub struct CourseRepo;

impl CourseRepo {
    /// Insert a new course, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateCourse) -> Result<Course, sqlx::Error> {
        let query = format!(
            "INSERT INTO courses (name, description, image_url, price)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Course>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.image_url)
            .bind(input.price)
            .fetch_one(pool)
            .await
    }

    /// Find a course by its primary key.
    pub async fn find_by_id<'e, E>(executor: E, id: DbId) -> Result<Option<Course>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM courses WHERE id = $1");
        sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Write back every mutable field of `course`, conditioned on the
    /// version it was read at.
    ///
    /// Returns the course with its new version. The `updated_at` of the
    /// returned value is the pre-update timestamp; refetch when it matters.
    pub async fn update<'e, E>(executor: E, course: &Course) -> Result<Course, UpdateError>
    where
        E: PgExecutor<'e>,
    {
        let version = VersionedUpdate::new(course)
            .set("name", course.name.clone())
            .set("description", course.description.clone())
            .set("image_url", course.image_url.clone())
            .set("price", course.price)
            .execute(executor)
            .await?;

        Ok(Course {
            version,
            ..course.clone()
        })
    }

    /// Whether `user_id` has a successful order containing `course_id`.
    pub async fn is_owned<'e, E>(
        executor: E,
        user_id: DbId,
        course_id: DbId,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM order_items i
                 JOIN orders o ON o.id = i.order_id
                 WHERE o.user_id = $1 AND i.course_id = $2 AND o.status_id = $3
             )",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(OrderStatus::Success.id())
        .fetch_one(executor)
        .await
    }

    /// List the courses a user has bought, ordered by id.
    pub async fn list_owned<'e, E>(executor: E, user_id: DbId) -> Result<Vec<Course>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT DISTINCT {JOINED_COLUMNS} FROM courses c
             JOIN order_items i ON i.course_id = c.id
             JOIN orders o ON o.id = i.order_id
             WHERE o.user_id = $1 AND o.status_id = $2
             ORDER BY c.id"
        );
        sqlx::query_as::<_, Course>(&query)
            .bind(user_id)
            .bind(OrderStatus::Success.id())
            .fetch_all(executor)
            .await
    }
}
