//! Cart operations behind the cart endpoints.
//!
//! The cart row is versioned; item rows are keyed by (user, course) so
//! adding the same course twice leaves one entry.

use coursehub_core::error::CoreError;
use coursehub_core::types::DbId;
use coursehub_db::models::cart::CartView;
use coursehub_db::repositories::{CartRepo, CourseRepo};
use coursehub_db::{is_foreign_key_violation, DbPool};

use crate::error::AppResult;

/// The user's cart with its items. A user without a cart sees an empty one.
pub async fn show(pool: &DbPool, user_id: DbId) -> AppResult<CartView> {
    let Some(cart) = CartRepo::find(pool, user_id).await? else {
        return Ok(CartView::empty());
    };
    let items = CartRepo::items(pool, user_id).await?;
    Ok(CartView::new(&cart, items))
}

/// Add a course to the cart.
///
/// Fails with [`CoreError::AlreadyOwned`] if the user has bought it and
/// with `NotFound` if the course does not exist. If the cart is deleted
/// between creating it and inserting the item, the cart is recreated once.
pub async fn add_item(pool: &DbPool, user_id: DbId, course_id: DbId) -> AppResult<CartView> {
    if CourseRepo::find_by_id(pool, course_id).await?.is_none() {
        return Err(CoreError::NotFound {
            entity: "Course",
            id: course_id,
        }
        .into());
    }
    if CourseRepo::is_owned(pool, user_id, course_id).await? {
        return Err(CoreError::AlreadyOwned { course_id }.into());
    }

    let mut retried = false;
    let cart = loop {
        let cart = CartRepo::upsert(pool, user_id).await?;
        match CartRepo::add_item(pool, user_id, course_id).await {
            Ok(true) => break cart,
            Ok(false) => {
                tracing::debug!(user_id, course_id, "Course already in cart");
                break cart;
            }
            Err(e) if !retried && is_foreign_key_violation(&e) => {
                tracing::debug!(user_id, course_id, "Cart deleted while adding, retrying");
                retried = true;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let items = CartRepo::items(pool, user_id).await?;
    Ok(CartView::new(&cart, items))
}

/// Remove a course from the cart. Removing an absent course succeeds.
pub async fn remove_item(pool: &DbPool, user_id: DbId, course_id: DbId) -> AppResult<()> {
    if !CartRepo::remove_item(pool, user_id, course_id).await? {
        tracing::debug!(user_id, course_id, "Cart item already absent");
    }
    Ok(())
}

/// Delete the cart and its items. Deleting an absent cart succeeds.
pub async fn delete(pool: &DbPool, user_id: DbId) -> AppResult<()> {
    if !CartRepo::flush(pool, user_id).await? {
        tracing::debug!(user_id, "Cart already empty");
    }
    Ok(())
}
