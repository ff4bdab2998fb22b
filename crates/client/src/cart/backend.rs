//! Cart endpoints behind a trait seam.
//!
//! The sync engine and the count broadcaster talk to a [`CartBackend`] so they
//! can be driven by a fake in tests. [`ApiCartBackend`] is the real thing.

use async_trait::async_trait;
use mely_core::{CartId, LineId, Quantity};
use rust_decimal::Decimal;
use tracing::instrument;

use super::model::{CartLine, LineReconciliation};
use super::wire::{CartCountDto, CartLineDto, LineUpdateDto};
use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, AuthenticatedTransport};

/// Cart operations against the commerce API.
#[async_trait]
pub trait CartBackend: Send + Sync {
    /// Fetch every line of the session's cart, in server order.
    async fn fetch_lines(&self) -> Result<Vec<CartLine>>;

    /// Set a line's quantity. `unit_price` is the price the line showed when
    /// the edit was sent, used when the response omits it.
    async fn update_quantity(
        &self,
        line: LineId,
        quantity: Quantity,
        unit_price: Decimal,
    ) -> Result<LineReconciliation>;

    /// Delete a line.
    async fn delete_line(&self, line: LineId) -> Result<()>;

    /// Authoritative number of items in the cart.
    async fn item_count(&self) -> Result<u32>;
}

/// [`CartBackend`] over the authenticated transport.
#[derive(Debug, Clone)]
pub struct ApiCartBackend {
    transport: AuthenticatedTransport,
}

impl ApiCartBackend {
    #[must_use]
    pub const fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Cart of the current session, read from the refresh credential and
    /// then the access credential.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NoActiveCart` if neither credential names a cart.
    pub fn cart_id(&self) -> Result<CartId> {
        let session = self.transport.session();
        session
            .refresh_claims()
            .and_then(|claims| claims.cart_id)
            .or_else(|| session.access_claims().and_then(|claims| claims.cart_id))
            .ok_or(ApiError::NoActiveCart)
    }
}

#[async_trait]
impl CartBackend for ApiCartBackend {
    #[instrument(skip(self))]
    async fn fetch_lines(&self) -> Result<Vec<CartLine>> {
        let cart_id = self.cart_id()?;
        let lines: Vec<CartLineDto> = self
            .transport
            .call_envelope(&ApiRequest::get(format!("cart/{cart_id}/details")))
            .await?;
        Ok(lines.into_iter().map(CartLine::from).collect())
    }

    #[instrument(skip(self, unit_price), fields(line = %line, quantity = %quantity))]
    async fn update_quantity(
        &self,
        line: LineId,
        quantity: Quantity,
        unit_price: Decimal,
    ) -> Result<LineReconciliation> {
        let request = ApiRequest::put(format!("cart/details/{line}"))
            .json(serde_json::json!({ "quantity": quantity.get() }));
        let update: Option<LineUpdateDto> = self.transport.call_envelope(&request).await?;
        Ok(update
            .unwrap_or_default()
            .into_reconciliation(quantity, unit_price))
    }

    #[instrument(skip(self))]
    async fn delete_line(&self, line: LineId) -> Result<()> {
        self.transport
            .call_empty(&ApiRequest::delete(format!("cart/details/{line}")))
            .await
    }

    #[instrument(skip(self))]
    async fn item_count(&self) -> Result<u32> {
        let cart_id = self.cart_id()?;
        let count: CartCountDto = self
            .transport
            .call_json(&ApiRequest::get(format!("carrito/cantidad/{cart_id}")))
            .await?;
        Ok(count.total_items)
    }
}
