//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gongora_core::{Email, OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

/// An order as stored in `storefront.orders`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    /// Purchaser.
    pub user_id: UserId,
    /// Purchaser e-mail at checkout time.
    pub customer_email: Option<Email>,
    /// Amount charged, whole CLP (goods + shipping).
    pub total: Decimal,
    pub status: OrderStatus,
    /// Webpay `token_ws`, set once the transaction is created.
    pub token: Option<String>,
    /// Buy-order reference sent to Webpay (`orden-{id}-{suffix}`).
    pub buy_order: Option<String>,
    /// Shipping form plus `shipping_cost`.
    pub shipping_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Address for order notifications.
    ///
    /// Prefers the purchaser's account e-mail, then the e-mail typed into the
    /// shipping form.
    #[must_use]
    pub fn notification_recipient(&self) -> Option<Email> {
        if let Some(email) = &self.customer_email {
            return Some(email.clone());
        }

        self.shipping_data
            .as_ref()
            .and_then(|data| data.get("email"))
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| Email::parse(raw).ok())
    }

    /// Total as a CLP price.
    #[must_use]
    pub const fn total_price(&self) -> Price {
        Price::clp(self.total)
    }
}

/// A line of an order, as stored in `storefront.order_items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Product name when the order was placed.
    pub product_name: String,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Input for creating a pending order with its items.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub customer_email: Option<Email>,
    pub total: Decimal,
    pub shipping_data: Option<serde_json::Value>,
    pub items: Vec<NewOrderItem>,
}

/// Input for one order line.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Shipping form captured by the checkout shipping step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Chilean national ID.
    #[serde(default)]
    pub rut: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub comuna: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_shipping_method")]
    pub shipping_method: String,
}

fn default_shipping_method() -> String {
    "pickup".to_string()
}

impl ShippingDetails {
    /// JSON stored in `orders.shipping_data`: the form plus the cost charged.
    #[must_use]
    pub fn to_order_data(&self, shipping_cost: i64) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(map) = value.as_object_mut() {
            map.insert("shipping_cost".to_string(), shipping_cost.into());
        }
        value
    }
}
