//! Order payment status and its transition rules.
//!
//! ```text
//! pending ──► paid
//!    │
//!    └──────► cancelled
//! ```
//!
//! `paid` and `cancelled` are terminal. Storage layers must apply the same
//! rule as a conditional update so concurrent confirmations cannot overwrite
//! each other.

use serde::{Deserialize, Serialize};

/// Order payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created at checkout, waiting for the processor's verdict.
    #[default]
    Pending,
    /// Payment authorized by the processor.
    Paid,
    /// Payment rejected, aborted or failed to start.
    Cancelled,
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid order status transition: {from} -> {to}")]
pub struct TransitionError {
    /// Status the order was in.
    pub from: OrderStatus,
    /// Status that was requested.
    pub to: OrderStatus,
}

impl OrderStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Validate a transition, returning the new status.
    ///
    /// Only `pending → paid` and `pending → cancelled` are accepted.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` for any other pair, including self-loops.
    pub const fn transition_to(self, to: Self) -> Result<Self, TransitionError> {
        match (self, to) {
            (Self::Pending, Self::Paid | Self::Cancelled) => Ok(to),
            _ => Err(TransitionError { from: self, to }),
        }
    }

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}
