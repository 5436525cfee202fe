//! Order and order item models.

use coursehub_core::types::{DbId, MinorUnits, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::status::{OrderStatus, StatusId};

/// An orders row from the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: DbId,
    pub user_id: DbId,
    /// The payment provider's identifier for the payment/session object.
    pub provider_id: String,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    /// Decoded lifecycle status; `None` for an id missing from `OrderStatus`.
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::from_id(self.status_id)
    }
}

/// An order_items row. `price` is the price captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct OrderItem {
    pub order_id: DbId,
    pub course_id: DbId,
    pub price: MinorUnits,
    pub created_at: Timestamp,
}

/// Input for creating a pending order together with its items.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub user_id: DbId,
    pub provider_id: String,
    pub items: Vec<CreateOrderItem>,
}

/// One line of a new order.
#[derive(Debug, Clone, Copy)]
pub struct CreateOrderItem {
    pub course_id: DbId,
    pub price: MinorUnits,
}
