//! Order history, cancellation and payment-proof upload.

use mely_core::{OrderId, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::transport::{ApiRequest, Attachment, AuthenticatedTransport};

/// One entry of the order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    #[serde(alias = "idPedido")]
    pub id: OrderId,
    /// Placement date as the backend formats it.
    #[serde(default, alias = "fecha_pedido", alias = "fechaPedido")]
    pub placed_at: String,
    #[serde(alias = "estado")]
    pub status: OrderStatus,
    pub total: Decimal,
    #[serde(default, alias = "direccion")]
    pub address: Option<String>,
}

/// How the customer paid for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    BankDeposit,
    Yape,
}

impl PaymentMethod {
    /// Value the backend expects in the `paymentMethod` field.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::BankDeposit => "Depósito Bancario",
            Self::Yape => "Yape",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bank-deposit" | "deposit" | "depósito bancario" | "deposito bancario" => {
                Ok(Self::BankDeposit)
            }
            "yape" => Ok(Self::Yape),
            _ => Err(format!("unknown payment method: {s}")),
        }
    }
}

/// Order endpoints.
#[derive(Debug, Clone)]
pub struct Orders {
    transport: AuthenticatedTransport,
}

impl Orders {
    #[must_use]
    pub const fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Orders of the signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<OrderSummary>> {
        self.transport
            .call_envelope(&ApiRequest::get("orders"))
            .await
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order: OrderId) -> Result<()> {
        let request =
            ApiRequest::post("cancel-order").json(serde_json::json!({ "orderId": order }));
        self.transport.call_empty(&request).await
    }

    /// Upload proof of payment for an order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses the file.
    #[instrument(skip(self, receipt), fields(file = %receipt.file_name, bytes = receipt.bytes.len()))]
    pub async fn upload_receipt(
        &self,
        order: OrderId,
        method: PaymentMethod,
        receipt: Attachment,
    ) -> Result<()> {
        let request = ApiRequest::post("upload-receipt").multipart(
            vec![
                ("orderId".to_string(), order.to_string()),
                ("paymentMethod".to_string(), method.wire_name().to_string()),
            ],
            vec![("receipt".to_string(), receipt)],
        );
        self.transport.call_empty(&request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_backend_order() {
        let order: OrderSummary = serde_json::from_value(serde_json::json!({
            "idPedido": 31,
            "fecha_pedido": "2024-11-02",
            "estado": "pendiente",
            "total": "189.90",
            "direccion": "Av. Los Olivos 123"
        }))
        .unwrap();

        assert_eq!(order.id, OrderId::new(31));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.status.is_cancellable());
        assert_eq!(order.total, Decimal::new(18990, 2));
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let order: OrderSummary = serde_json::from_value(serde_json::json!({
            "id": 1,
            "status": "en revisión",
            "total": 10
        }))
        .unwrap();
        assert_eq!(order.status, OrderStatus::Other("en revisión".to_string()));
        assert!(order.placed_at.is_empty());
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("yape".parse::<PaymentMethod>().unwrap(), PaymentMethod::Yape);
        assert_eq!(
            "Depósito Bancario".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankDeposit
        );
        assert!("cash".parse::<PaymentMethod>().is_err());
    }
}
