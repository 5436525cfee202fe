//! Repository for the `carts` and `cart_items` tables.

use coursehub_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::is_unique_violation;
use crate::models::cart::{Cart, CartItem, CourseSnapshot};
use crate::versioned::{UpdateError, VersionedUpdate};

const CART_COLUMNS: &str = "user_id, version, created_at, updated_at";

const ITEM_COLUMNS: &str = "user_id, course_id, created_at, updated_at";

/// Provides operations on the per-user cart aggregate.
pub struct CartRepo;

impl CartRepo {
    /// Find the cart row for a user.
    pub async fn find<'e, E>(executor: E, user_id: DbId) -> Result<Option<Cart>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1");
        sqlx::query_as::<_, Cart>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Insert an empty cart. Fails with a unique violation if one exists.
    pub async fn create<'e, E>(executor: E, user_id: DbId) -> Result<Cart, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("INSERT INTO carts (user_id) VALUES ($1) RETURNING {CART_COLUMNS}");
        sqlx::query_as::<_, Cart>(&query)
            .bind(user_id)
            .fetch_one(executor)
            .await
    }

    /// Bump the cart's version and `updated_at`, conditioned on `cart.version`.
    pub async fn touch<'e, E>(executor: E, cart: &Cart) -> Result<Cart, UpdateError>
    where
        E: PgExecutor<'e>,
    {
        let version = VersionedUpdate::new(cart).execute(executor).await?;
        Ok(Cart {
            version,
            ..cart.clone()
        })
    }

    /// Ensure the user has a cart and mark it as modified.
    ///
    /// A concurrent create or touch is retried once against the fresh row;
    /// a second collision is returned to the caller.
    pub async fn upsert(pool: &PgPool, user_id: DbId) -> Result<Cart, UpdateError> {
        let mut retried = false;
        loop {
            let outcome = match Self::find(pool, user_id).await? {
                None => Self::create(pool, user_id).await.map_err(UpdateError::from),
                Some(cart) => Self::touch(pool, &cart).await,
            };

            match outcome {
                Err(err) if !retried && is_lost_race(&err) => {
                    tracing::debug!(user_id, error = %err, "Cart upsert raced, retrying");
                    retried = true;
                }
                other => return other,
            }
        }
    }

    /// Items in the user's cart, ordered by course id.
    pub async fn items<'e, E>(executor: E, user_id: DbId) -> Result<Vec<CartItem>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY course_id"
        );
        sqlx::query_as::<_, CartItem>(&query)
            .bind(user_id)
            .fetch_all(executor)
            .await
    }

    /// Add a course to the cart. Returns `false` if it was already there.
    pub async fn add_item<'e, E>(
        executor: E,
        user_id: DbId,
        course_id: DbId,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "INSERT INTO cart_items (user_id, course_id) VALUES ($1, $2)
             ON CONFLICT ON CONSTRAINT uq_cart_items_user_course DO NOTHING",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a course from the cart. Returns `true` if a row was deleted.
    pub async fn remove_item<'e, E>(
        executor: E,
        user_id: DbId,
        course_id: DbId,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the cart and, by cascade, its items. Returns `true` if a cart
    /// existed.
    pub async fn flush<'e, E>(executor: E, user_id: DbId) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM carts WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Current course details for every cart entry, ordered by course id.
    pub async fn snapshot<'e, E>(
        executor: E,
        user_id: DbId,
    ) -> Result<Vec<CourseSnapshot>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, CourseSnapshot>(
            "SELECT c.id AS course_id, c.name, c.description, c.price
             FROM cart_items i
             JOIN courses c ON c.id = i.course_id
             WHERE i.user_id = $1
             ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }
}

fn is_lost_race(err: &UpdateError) -> bool {
    match err {
        UpdateError::VersionConflict { .. } => true,
        UpdateError::Database(db) => is_unique_violation(db),
    }
}
