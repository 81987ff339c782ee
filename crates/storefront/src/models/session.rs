//! Session-related types.
//!
//! The login flow itself lives outside the storefront; it writes a
//! [`CurrentUser`] under [`keys::CURRENT_USER`] and everything here reads it.

use serde::{Deserialize, Serialize};

use gongora_core::{Email, UserId};

/// Session-stored user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// Session keys.
pub mod keys {
    /// The logged-in user ([`super::CurrentUser`]).
    pub const CURRENT_USER: &str = "current_user";

    /// Cart lines ([`crate::models::cart::SessionCart`]).
    pub const CART: &str = "cart";

    /// Shipping form from the checkout shipping step.
    pub const CHECKOUT_SHIPPING: &str = "checkout_shipping";
}
