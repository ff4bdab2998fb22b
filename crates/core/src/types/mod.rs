//! Core types for the storefront client.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod quantity;
pub mod status;

pub use id::*;
pub use price::{CurrencyCode, Price, line_subtotal};
pub use quantity::{Quantity, QuantityError};
pub use status::*;
