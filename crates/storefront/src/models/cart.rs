//! Session-scoped shopping cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gongora_core::{Price, ProductId};

use super::order::NewOrderItem;
use crate::db::products::Product;

/// Most units of one product a cart line can hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Cart stored in the session under [`super::session::keys::CART`].
///
/// Lines keep insertion order; a product appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCart {
    #[serde(default)]
    lines: Vec<CartLine>,
}

impl SessionCart {
    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// The line is capped at [`MAX_LINE_QUANTITY`].
    pub fn add(&mut self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let quantity = quantity.min(MAX_LINE_QUANTITY);

        if let Some(line) = self.line_mut(product.id) {
            line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
            line.unit_price = product.price;
            return;
        }

        self.lines.push(CartLine {
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity,
        });
    }

    /// Set a line's quantity, capped at [`MAX_LINE_QUANTITY`]; zero removes
    /// it.
    ///
    /// Returns `false` if the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(product_id);
        }

        match self.line_mut(product_id) {
            Some(line) => {
                line.quantity = quantity.min(MAX_LINE_QUANTITY);
                true
            }
            None => false,
        }
    }

    /// Remove a product. Returns `false` if it was not in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        self.lines.len() != before
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |count, line| count.saturating_add(line.quantity))
    }

    /// Sum of line subtotals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    #[must_use]
    pub fn subtotal_price(&self) -> Price {
        Price::clp(self.subtotal())
    }

    /// Order lines for persisting this cart.
    #[must_use]
    pub fn to_order_items(&self) -> Vec<NewOrderItem> {
        self.lines
            .iter()
            .map(|line| {
                let quantity = i32::try_from(line.quantity).unwrap_or(i32::MAX);
                NewOrderItem {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    quantity,
                    subtotal: line.unit_price * Decimal::from(quantity),
                }
            })
            .collect()
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| line.product_id == product_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: i32, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Anillo {id}"),
            price: Decimal::new(price, 0),
        }
    }

    #[test]
    fn test_add_merges_same_product() {
        let mut cart = SessionCart::default();
        cart.add(&product(1, 10_000), 1);
        cart.add(&product(1, 10_000), 2);
        cart.add(&product(2, 5_500), 1);

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.subtotal(), Decimal::new(35_500, 0));
    }

    #[test]
    fn test_add_zero_is_ignored() {
        let mut cart = SessionCart::default();
        cart.add(&product(1, 10_000), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let mut cart = SessionCart::default();
        cart.add(&product(1, 10_000), 1);

        assert!(cart.set_quantity(ProductId::new(1), 3));
        assert_eq!(cart.subtotal(), Decimal::new(30_000, 0));

        assert!(!cart.set_quantity(ProductId::new(9), 3));

        assert!(cart.set_quantity(ProductId::new(1), 0));
        assert!(cart.is_empty());
        assert!(!cart.remove(ProductId::new(1)));
    }

    #[test]
    fn test_to_order_items() {
        let mut cart = SessionCart::default();
        cart.add(&product(3, 12_990), 2);

        let items = cart.to_order_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].subtotal, Decimal::new(25_980, 0));
        assert_eq!(items[0].product_name, "Anillo 3");
    }

    #[test]
    fn test_quantities_are_capped_per_line() {
        let mut cart = SessionCart::default();
        cart.add(&product(1, 10_000), u32::MAX);
        cart.add(&product(1, 10_000), 5);
        cart.add(&product(2, 5_500), 1);
        assert!(cart.set_quantity(ProductId::new(2), u32::MAX));

        assert_eq!(cart.lines()[0].quantity, MAX_LINE_QUANTITY);
        assert_eq!(cart.lines()[1].quantity, MAX_LINE_QUANTITY);
        assert_eq!(cart.item_count(), 2 * MAX_LINE_QUANTITY);

        for item in cart.to_order_items() {
            let line = cart
                .lines()
                .iter()
                .find(|line| line.product_id == item.product_id)
                .unwrap();
            assert_eq!(item.quantity, 99);
            assert_eq!(item.subtotal, line.unit_price * Decimal::from(item.quantity));
        }
    }

    #[test]
    fn test_item_count_saturates_on_stored_lines() {
        let line = |id| CartLine {
            product_id: ProductId::new(id),
            product_name: format!("Anillo {id}"),
            unit_price: Decimal::ONE,
            quantity: u32::MAX,
        };
        let cart = SessionCart {
            lines: vec![line(1), line(2)],
        };

        assert_eq!(cart.item_count(), u32::MAX);
    }

    #[test]
    fn test_deserializes_missing_lines() {
        let cart: SessionCart = serde_json::from_str("{}").unwrap_or_default();
        assert!(cart.is_empty());
    }
}
