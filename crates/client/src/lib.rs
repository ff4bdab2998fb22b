//! MelyMarck storefront client.
//!
//! Talks to the store's commerce API on behalf of one signed-in user:
//! - [`session`] - Credential set, claims and durable persistence
//! - [`transport`] - Authenticated HTTP with single-flight renewal
//! - [`cart`] - Cart model, optimistic sync engine and count broadcaster
//! - [`account`] / [`orders`] - Login, logout and order history
//! - [`catalog`] / [`addresses`] - Product browsing, category admin and
//!   delivery addresses
//!
//! [`Storefront`] wires these together from a [`ClientConfig`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod account;
pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod notify;
pub mod orders;
pub mod session;
pub mod storefront;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, Result};
pub use storefront::Storefront;
