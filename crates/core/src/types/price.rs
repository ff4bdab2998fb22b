//! Type-safe price representation using decimal arithmetic.
//!
//! All money in the storefront is carried as [`Decimal`] so that subtotals
//! and totals add up exactly to the cent. Line subtotals are rounded to two
//! decimal places with midpoint-away-from-zero, the rounding the backend
//! applies when it reports a subtotal.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Compute the subtotal of a cart line: `round(unit_price * quantity, 2)`.
///
/// ```
/// use mely_core::{Quantity, line_subtotal};
/// use rust_decimal::Decimal;
///
/// let unit = Decimal::new(2500, 2); // 25.00
/// let quantity = Quantity::try_from(4).unwrap();
/// assert_eq!(line_subtotal(unit, quantity), Decimal::new(10000, 2));
/// ```
#[must_use]
pub fn line_subtotal(unit_price: Decimal, quantity: Quantity) -> Decimal {
    (unit_price * Decimal::from(quantity.get()))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., soles, not céntimos).
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

    /// Create a price in the store's default currency.
    #[must_use]
    pub fn store(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::default())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self
            .amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        write!(f, "{}{:.2}", self.currency_code.symbol(), amount)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    PEN,
    USD,
    EUR,
}

impl CurrencyCode {
    /// Display symbol, including the trailing separator where one is customary.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::PEN => "S/ ",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }
}
