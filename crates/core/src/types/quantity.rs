//! Cart line quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Quantity`] from user input.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// The value is outside the editable range.
    #[error("quantity must be between {min} and {max} (got {got})")]
    OutOfRange {
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
        /// The rejected value.
        got: i64,
    },
}

/// Number of units on a cart line.
///
/// Local edits are restricted to [`Quantity::MIN`]..=[`Quantity::MAX`].
/// Values reported by the server are trusted as-is through
/// [`Quantity::authoritative`], because the backend may hold a quantity the
/// client would not let a user type (e.g. after a stock correction).
///
/// ## Examples
///
/// ```
/// use mely_core::Quantity;
///
/// assert!(Quantity::try_from(3).is_ok());
/// assert!(Quantity::try_from(0).is_err());
/// assert!(Quantity::try_from(11).is_err());
///
/// // Input fields clamp on blur instead of rejecting
/// assert_eq!(Quantity::clamped(25).get(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// Smallest quantity a user can set on a line.
    pub const MIN: u32 = 1;
    /// Largest quantity a user can set on a line.
    pub const MAX: u32 = 10;

    /// Wrap a quantity reported by the server without range checks.
    #[must_use]
    pub const fn authoritative(value: u32) -> Self {
        Self(value)
    }

    /// Clamp arbitrary input into the editable range.
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        let clamped = value.clamp(i64::from(Self::MIN), i64::from(Self::MAX));
        // The clamp above keeps the value inside u32 range.
        Self(u32::try_from(clamped).unwrap_or(Self::MIN))
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this value could have been produced by a local edit.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        self.0 >= Self::MIN && self.0 <= Self::MAX
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(QuantityError::OutOfRange {
                min: Self::MIN,
                max: Self::MAX,
                got: value,
            });
        }
        Ok(Self(u32::try_from(value).map_err(|_| QuantityError::OutOfRange {
            min: Self::MIN,
            max: Self::MAX,
            got: value,
        })?))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(Quantity::try_from(1).map(Quantity::get), Ok(1));
        assert_eq!(Quantity::try_from(10).map(Quantity::get), Ok(10));
    }

    #[test]
    fn test_out_of_range_reports_value() {
        let err = Quantity::try_from(-3).unwrap_err();
        assert_eq!(
            err,
            QuantityError::OutOfRange {
                min: 1,
                max: 10,
                got: -3
            }
        );
        assert_eq!(err.to_string(), "quantity must be between 1 and 10 (got -3)");
    }

    #[test]
    fn test_clamped() {
        assert_eq!(Quantity::clamped(0).get(), 1);
        assert_eq!(Quantity::clamped(-100).get(), 1);
        assert_eq!(Quantity::clamped(4).get(), 4);
        assert_eq!(Quantity::clamped(i64::MAX).get(), 10);
    }

    #[test]
    fn test_authoritative_skips_range_check() {
        let quantity = Quantity::authoritative(12);
        assert_eq!(quantity.get(), 12);
        assert!(!quantity.is_editable());
    }
}
