//! Repository for the `orders` and `order_items` tables.

use coursehub_core::types::{DbId, MinorUnits, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::order::{CreateOrder, Order, OrderItem};
use crate::models::status::OrderStatus;

const COLUMNS: &str = "id, user_id, provider_id, status_id, created_at, updated_at";

const ITEM_COLUMNS: &str = "order_id, course_id, price, created_at";

/// Provides persistence for orders and their captured line items.
pub struct OrderRepo;

impl OrderRepo {
    /// Insert a pending order and all of its items in one transaction.
    ///
    /// Either the order and every item are stored, or nothing is.
    pub async fn create_with_items(pool: &PgPool, input: &CreateOrder) -> Result<Order, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO orders (user_id, provider_id, status_id)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&query)
            .bind(input.user_id)
            .bind(&input.provider_id)
            .bind(OrderStatus::Pending.id())
            .fetch_one(&mut *tx)
            .await?;

        for item in &input.items {
            sqlx::query("INSERT INTO order_items (order_id, course_id, price) VALUES ($1, $2, $3)")
                .bind(order.id)
                .bind(item.course_id)
                .bind(item.price)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Find an order by primary key.
    pub async fn find_by_id<'e, E>(executor: E, id: DbId) -> Result<Option<Order>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find an order by the payment provider's identifier.
    pub async fn find_by_provider_id<'e, E>(
        executor: E,
        provider_id: &str,
    ) -> Result<Option<Order>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE provider_id = $1");
        sqlx::query_as::<_, Order>(&query)
            .bind(provider_id)
            .fetch_optional(executor)
            .await
    }

    /// Items of an order, ordered by course id.
    pub async fn items<'e, E>(executor: E, order_id: DbId) -> Result<Vec<OrderItem>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY course_id"
        );
        sqlx::query_as::<_, OrderItem>(&query)
            .bind(order_id)
            .fetch_all(executor)
            .await
    }

    /// Names of the courses in an order, ordered by course id.
    pub async fn course_names<'e, E>(executor: E, order_id: DbId) -> Result<Vec<String>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT c.name FROM order_items i
             JOIN courses c ON c.id = i.course_id
             WHERE i.order_id = $1
             ORDER BY c.id",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await
    }

    /// Sum of the captured item prices.
    pub async fn total<'e, E>(executor: E, order_id: DbId) -> Result<MinorUnits, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COALESCE(SUM(price), 0)::BIGINT FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(executor)
            .await
    }

    /// Move a pending order to success. Returns `false` if the order was
    /// not pending (already fulfilled, expired, or missing).
    pub async fn mark_success<'e, E>(executor: E, order_id: DbId) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE orders SET status_id = $2, updated_at = now()
             WHERE id = $1 AND status_id = $3",
        )
        .bind(order_id)
        .bind(OrderStatus::Success.id())
        .bind(OrderStatus::Pending.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire pending orders created before `cutoff`. Returns the count.
    pub async fn expire_stale<'e, E>(executor: E, cutoff: Timestamp) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE orders SET status_id = $1, updated_at = now()
             WHERE status_id = $2 AND created_at < $3",
        )
        .bind(OrderStatus::Expired.id())
        .bind(OrderStatus::Pending.id())
        .bind(cutoff)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
