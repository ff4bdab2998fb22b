//! Integration tests for the MelyMarck storefront client.
//!
//! Every test runs the real HTTP transport against a `wiremock` server that
//! stands in for the store API, mounted under `/api/`.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mely-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `transport_renewal` - 401 handling and single-flight renewal
//! - `transport_errors` - Maintenance, rejection and network classification
//! - `cart_flow` - Cart edits and removals over HTTP
//! - `account_orders` - Login, logout and order endpoints

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mely_client::session::{Persistence, SessionStore, TokenGrant};
use mely_client::{ClientConfig, Storefront};
use serde_json::{Value, json};
use url::Url;
use wiremock::MockServer;

/// Cart id carried by the credentials [`signed_in`] installs.
pub const CART_ID: i64 = 7;

/// Refresh credential installed by [`signed_in`].
pub const REFRESH_TOKEN: &str = "refresh-1";

/// Refresh credential identifier installed by [`signed_in`].
pub const REFRESH_TOKEN_ID: &str = "rt-id-1";

/// Build an unsigned token carrying the given payload.
#[must_use]
pub fn token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Customer access token for [`CART_ID`]; `label` keeps tokens distinct.
#[must_use]
pub fn customer_token(label: &str) -> String {
    token(&json!({
        "idUsuario": 15,
        "rol": "cliente",
        "idCarrito": CART_ID,
        "jti": label
    }))
}

/// Value of the `Authorization` header for `token`.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Client configuration pointing at the mock server.
#[must_use]
pub fn config_for(server: &MockServer) -> ClientConfig {
    let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let mut config = ClientConfig::new(base);
    config.request_timeout = Duration::from_secs(5);
    config.cart_debounce = Duration::from_millis(50);
    config
}

/// Storefront with no session.
#[must_use]
pub fn signed_out(server: &MockServer) -> Storefront {
    Storefront::with_session(&config_for(server), Arc::new(SessionStore::in_memory())).unwrap()
}

/// Storefront whose session holds `access` plus the fixed refresh credential.
#[must_use]
pub fn signed_in(server: &MockServer, access: &str) -> Storefront {
    signed_in_with(&config_for(server), access)
}

/// Same as [`signed_in`] with a caller-supplied configuration.
#[must_use]
pub fn signed_in_with(config: &ClientConfig, access: &str) -> Storefront {
    let session = SessionStore::in_memory();
    session
        .install(
            TokenGrant {
                access_token: Some(access.to_string()),
                refresh_token: Some(REFRESH_TOKEN.to_string()),
                refresh_token_id: Some(REFRESH_TOKEN_ID.to_string()),
            },
            Persistence::Session,
        )
        .unwrap();
    Storefront::with_session(config, Arc::new(session)).unwrap()
}

/// Body of a successful renewal or login.
#[must_use]
pub fn grant_body(access: &str, refresh: &str, refresh_id: &str) -> Value {
    json!({
        "accessToken": access,
        "refreshToken": refresh,
        "idRefreshToken": refresh_id
    })
}

/// One cart line as the backend lists it.
#[must_use]
pub fn line_body(id: i64, quantity: u32, price: &str, name: &str) -> Value {
    json!({
        "idDetalle": id,
        "cantidad": quantity,
        "producto": { "idProducto": id * 10, "nombreProducto": name, "precio": price },
        "modelo": { "idModelo": id * 100, "nombreModelo": "Talla M", "stock": 10 }
    })
}
