//! In-memory [`OrderStore`] for tests and local development without Postgres.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use gongora_core::{OrderId, OrderItemId, OrderStatus, UserId};

use super::RepositoryError;
use super::orders::{OrderStore, Transition};
use crate::models::{NewOrder, Order, OrderItem};

#[derive(Default)]
struct Tables {
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
    next_order_id: i32,
    next_item_id: i32,
}

/// A thread-safe in-memory order store.
///
/// Applies the same rules as the Postgres store: tokens and buy-order
/// references are unique, and status only moves out of `pending` once.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored order, by ascending ID.
    pub async fn all(&self) -> Vec<Order> {
        self.tables.read().await.orders.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.write().await;

        tables.next_order_id += 1;
        let id = OrderId::new(tables.next_order_id);
        let now = Utc::now();

        let stored = Order {
            id,
            user_id: order.user_id,
            customer_email: order.customer_email,
            total: order.total,
            status: OrderStatus::Pending,
            token: None,
            buy_order: None,
            shipping_data: order.shipping_data,
            created_at: now,
            updated_at: now,
        };

        for item in order.items {
            tables.next_item_id += 1;
            let item_id = OrderItemId::new(tables.next_item_id);
            tables.items.push(OrderItem {
                id: item_id,
                order_id: id,
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                subtotal: item.subtotal,
            });
        }

        tables.orders.insert(id, stored.clone());
        Ok(stored)
    }

    async fn attach_payment(
        &self,
        id: OrderId,
        token: &str,
        buy_order: &str,
    ) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.write().await;

        let duplicate = tables.orders.values().any(|o| {
            o.id != id
                && (o.token.as_deref() == Some(token) || o.buy_order.as_deref() == Some(buy_order))
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "token or buy order already assigned: {buy_order}"
            )));
        }

        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.token = Some(token.to_string());
        order.buy_order = Some(buy_order.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.token.as_deref() == Some(token))
            .cloned())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: OrderId,
        to: OrderStatus,
    ) -> Result<Transition, RepositoryError> {
        OrderStatus::Pending.transition_to(to)?;

        let mut tables = self.tables.write().await;
        let order = tables.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        if order.status.is_terminal() {
            return Ok(Transition::AlreadySettled(order.clone()));
        }

        order.status = order.status.transition_to(to)?;
        order.updated_at = Utc::now();
        Ok(Transition::Applied(order.clone()))
    }

    async fn items(&self, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .iter()
            .filter(|item| item.order_id == id)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use gongora_core::ProductId;

    use super::*;
    use crate::models::NewOrderItem;

    fn new_order(user: i32) -> NewOrder {
        NewOrder {
            user_id: UserId::new(user),
            customer_email: None,
            total: Decimal::new(10_000, 0),
            shipping_data: None,
            items: vec![NewOrderItem {
                product_id: ProductId::new(1),
                product_name: "Aros de plata".to_string(),
                quantity: 1,
                subtotal: Decimal::new(10_000, 0),
            }],
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = InMemoryOrderStore::new();
        let order = store.create_pending(new_order(1)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        store
            .attach_payment(order.id, "tok-1", "orden-1-aaaaaa")
            .await
            .unwrap();

        let found = store.find_by_token("tok-1").await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert_eq!(found.buy_order.as_deref(), Some("orden-1-aaaaaa"));
        assert_eq!(store.items(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_token_is_unique() {
        let store = InMemoryOrderStore::new();
        let first = store.create_pending(new_order(1)).await.unwrap();
        let second = store.create_pending(new_order(1)).await.unwrap();

        store.attach_payment(first.id, "tok", "orden-1-a").await.unwrap();
        let err = store
            .attach_payment(second.id, "tok", "orden-2-b")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transition_only_once() {
        let store = InMemoryOrderStore::new();
        let order = store.create_pending(new_order(1)).await.unwrap();

        let first = store.transition(order.id, OrderStatus::Paid).await.unwrap();
        assert!(matches!(
            first,
            Transition::Applied(ref order) if order.status == OrderStatus::Paid
        ));

        let second = store
            .transition(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(
            second,
            Transition::AlreadySettled(ref order) if order.status == OrderStatus::Paid
        ));
    }

    #[tokio::test]
    async fn test_transition_to_pending_rejected() {
        let store = InMemoryOrderStore::new();
        let order = store.create_pending(new_order(1)).await.unwrap();

        let err = store
            .transition(order.id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_list_for_user_newest_first() {
        let store = InMemoryOrderStore::new();
        let a = store.create_pending(new_order(1)).await.unwrap();
        store.create_pending(new_order(2)).await.unwrap();
        let c = store.create_pending(new_order(1)).await.unwrap();

        let ids: Vec<_> = store
            .list_for_user(UserId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![c.id, a.id]);
    }
}
