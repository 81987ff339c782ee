//! Core types for the Góngora storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod geo;
pub mod id;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use geo::GeoEntry;
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::{OrderStatus, TransitionError};
