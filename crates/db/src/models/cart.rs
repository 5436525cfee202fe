//! Cart aggregate models.

use coursehub_core::types::{DbId, MinorUnits, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::Versioned;

/// A carts row. One per user; `user_id` is the primary key.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Cart {
    #[serde(skip)]
    pub user_id: DbId,
    #[serde(skip)]
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Versioned for Cart {
    const TABLE: &'static str = "carts";
    const KEY_COLUMN: &'static str = "user_id";
    const ENTITY: &'static str = "Cart";

    fn key(&self) -> DbId {
        self.user_id
    }

    fn version(&self) -> i32 {
        self.version
    }
}

/// A cart_items row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CartItem {
    #[serde(skip)]
    pub user_id: DbId,
    pub course_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Request body for adding a course to the cart.
#[derive(Debug, Clone, Deserialize)]
pub struct AddCartItem {
    pub course_id: DbId,
}

/// Live course details for a cart entry, read at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CourseSnapshot {
    pub course_id: DbId,
    pub name: String,
    pub description: String,
    pub price: MinorUnits,
}

/// Cart with its items, as returned by the cart endpoints.
///
/// A user without a cart row is shown as an empty cart.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub items: Vec<CartItem>,
}

impl CartView {
    pub fn empty() -> Self {
        Self {
            created_at: None,
            updated_at: None,
            items: Vec::new(),
        }
    }

    pub fn new(cart: &Cart, items: Vec<CartItem>) -> Self {
        Self {
            created_at: Some(cart.created_at),
            updated_at: Some(cart.updated_at),
            items,
        }
    }
}
