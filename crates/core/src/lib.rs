//! Góngora Core - Shared domain types.
//!
//! This crate provides the types shared by the storefront binary and the CLI:
//! - `storefront` - Public shop, checkout and Webpay payment flow
//! - `cli` - Migrations and geo snapshot export
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. The order status state machine lives here so that
//! every layer applies the same transition rules.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, e-mail, CLP prices, order status, geo entries

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
