//! Domain models for the storefront.

pub mod cart;
pub mod order;
pub mod session;

pub use cart::{CartLine, MAX_LINE_QUANTITY, SessionCart};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, ShippingDetails};
pub use session::{CurrentUser, keys as session_keys};
