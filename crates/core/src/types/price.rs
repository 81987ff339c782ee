//! Type-safe price representation using decimal arithmetic.
//!
//! The shop charges in Chilean pesos, which have no minor unit: Webpay
//! expects the amount as a whole number, so conversions truncate toward zero.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in Chilean pesos.
    #[must_use]
    pub const fn clp(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::CLP)
    }

    /// Whole currency units, truncated toward zero.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn whole_units(&self) -> Option<i64> {
        self.amount.trunc().to_i64()
    }

    /// Format for display, e.g. `$12.990` (dot as thousands separator).
    #[must_use]
    pub fn display(&self) -> String {
        let units = self.amount.trunc().abs().to_string();
        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, ch) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.amount.is_sign_negative() && !self.amount.trunc().is_zero() {
            "-"
        } else {
            ""
        };
        format!("{sign}{}{grouped}", self.currency_code.symbol())
    }
}

/// ISO 4217 currency codes accepted by the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    CLP,
    USD,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::CLP => "$",
            Self::USD => "US$",
        }
    }
}
