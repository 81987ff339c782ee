//! Order storage.
//!
//! [`OrderStore`] is the seam the payment flow talks to. [`PgOrderStore`] is
//! the production implementation; [`super::InMemoryOrderStore`] backs tests.
//!
//! Status changes go through [`OrderStore::transition`], which only moves an
//! order out of `pending`. In Postgres this is a conditional `UPDATE` so two
//! confirmations racing for the same token cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use gongora_core::{Email, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::RepositoryError;
use crate::models::{NewOrder, Order, OrderItem};

/// Result of a status transition request.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The order was pending and now has the requested status.
    Applied(Order),
    /// The order had already left `pending`; it is returned unchanged.
    AlreadySettled(Order),
}

/// Persistence operations needed by checkout and payment confirmation.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a `pending` order and its items atomically.
    async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Record the processor token and buy-order reference.
    async fn attach_payment(
        &self,
        id: OrderId,
        token: &str,
        buy_order: &str,
    ) -> Result<Order, RepositoryError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Order>, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Move a pending order to `to`.
    ///
    /// Returns [`Transition::AlreadySettled`] when the order is no longer
    /// pending, and `RepositoryError::InvalidTransition` when `to` is not a
    /// terminal status.
    async fn transition(&self, id: OrderId, to: OrderStatus)
    -> Result<Transition, RepositoryError>;

    async fn items(&self, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;

    /// Orders placed by a user, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    customer_email: Option<String>,
    total: Decimal,
    status: OrderStatus,
    token: Option<String>,
    buy_order: Option<String>,
    shipping_data: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let customer_email = row
            .customer_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            customer_email,
            total: row.total,
            status: row.status,
            token: row.token,
            buy_order: row.buy_order,
            shipping_data: row.shipping_data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    product_name: String,
    quantity: i32,
    subtotal: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity: row.quantity,
            subtotal: row.subtotal,
        }
    }
}

fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(db_err.message().to_string());
    }
    RepositoryError::Database(err)
}

// =============================================================================
// Postgres implementation
// =============================================================================

/// `PostgreSQL`-backed order store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO storefront.orders (user_id, customer_email, total, status, shipping_data)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING id, user_id, customer_email, total, status, token, buy_order,
                      shipping_data, created_at, updated_at
            ",
        )
        .bind(order.user_id.as_i32())
        .bind(order.customer_email.as_ref().map(Email::as_str))
        .bind(order.total)
        .bind(&order.shipping_data)
        .fetch_one(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r"
                INSERT INTO storefront.order_items (order_id, product_id, product_name, quantity, subtotal)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(row.id)
            .bind(item.product_id.as_i32())
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.try_into()
    }

    async fn attach_payment(
        &self,
        id: OrderId,
        token: &str,
        buy_order: &str,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            UPDATE storefront.orders
            SET token = $2, buy_order = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, customer_email, total, status, token, buy_order,
                      shipping_data, created_at, updated_at
            ",
        )
        .bind(id.as_i32())
        .bind(token)
        .bind(buy_order)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, customer_email, total, status, token, buy_order,
                   shipping_data, created_at, updated_at
            FROM storefront.orders
            WHERE token = $1
            ",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, customer_email, total, status, token, buy_order,
                   shipping_data, created_at, updated_at
            FROM storefront.orders
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn transition(
        &self,
        id: OrderId,
        to: OrderStatus,
    ) -> Result<Transition, RepositoryError> {
        OrderStatus::Pending.transition_to(to)?;

        let updated = sqlx::query_as::<_, OrderRow>(
            r"
            UPDATE storefront.orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, user_id, customer_email, total, status, token, buy_order,
                      shipping_data, created_at, updated_at
            ",
        )
        .bind(id.as_i32())
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(Transition::Applied(row.try_into()?));
        }

        let current = self.get(id).await?.ok_or(RepositoryError::NotFound)?;
        Ok(Transition::AlreadySettled(current))
    }

    async fn items(&self, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, product_name, quantity, subtotal
            FROM storefront.order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, customer_email, total, status, token, buy_order,
                   shipping_data, created_at, updated_at
            FROM storefront.orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(customer_email: Option<&str>) -> OrderRow {
        OrderRow {
            id: 4,
            user_id: 2,
            customer_email: customer_email.map(str::to_string),
            total: Decimal::new(19_990, 0),
            status: OrderStatus::Pending,
            token: Some("tok".to_string()),
            buy_order: Some("orden-4-abc123".to_string()),
            shipping_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let order = Order::try_from(row(Some("ana@gongora.cl"))).unwrap();
        assert_eq!(order.id, OrderId::new(4));
        assert_eq!(order.user_id, UserId::new(2));
        assert_eq!(order.customer_email.unwrap().as_str(), "ana@gongora.cl");
    }

    #[test]
    fn test_row_with_corrupt_email() {
        let err = Order::try_from(row(Some("sin-arroba"))).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
