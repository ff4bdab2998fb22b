//! Wire shapes of the cart endpoints.
//!
//! The backend speaks Spanish field names (`idDetalle`, `cantidad`,
//! `producto`, ...); the English spellings are accepted as well.

use mely_core::{LineId, ProductId, Quantity, VariantId, line_subtotal};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::model::{CartLine, LineReconciliation, ProductRef, VariantRef};

/// One entry of `GET cart/{id}/details`.
#[derive(Debug, Deserialize)]
pub struct CartLineDto {
    #[serde(alias = "idDetalle", alias = "lineId")]
    pub id: LineId,
    #[serde(alias = "cantidad")]
    pub quantity: u32,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(alias = "producto")]
    pub product: ProductDto,
    #[serde(default, alias = "modelo")]
    pub variant: Option<VariantDto>,
}

#[derive(Debug, Deserialize)]
pub struct ProductDto {
    #[serde(default, alias = "idProducto")]
    pub id: Option<ProductId>,
    #[serde(default, alias = "nombreProducto", alias = "nombre")]
    pub name: String,
    #[serde(alias = "precio", alias = "unitPrice")]
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct VariantDto {
    #[serde(default, alias = "idModelo")]
    pub id: Option<VariantId>,
    #[serde(default, alias = "nombreModelo", alias = "nombre")]
    pub name: String,
    #[serde(default)]
    pub stock: Option<StockDto>,
}

/// Stock is reported either as a bare number or as `{"cantidad": n}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StockDto {
    Units(u32),
    Record {
        #[serde(alias = "cantidad")]
        quantity: u32,
    },
}

impl StockDto {
    pub const fn units(&self) -> u32 {
        match self {
            Self::Units(units) | Self::Record { quantity: units } => *units,
        }
    }
}

impl From<CartLineDto> for CartLine {
    fn from(dto: CartLineDto) -> Self {
        let quantity = Quantity::authoritative(dto.quantity);
        let unit_price = dto.product.price;
        let subtotal = dto
            .subtotal
            .unwrap_or_else(|| line_subtotal(unit_price, quantity));
        let variant = dto.variant.map_or_else(
            || VariantRef {
                id: None,
                name: String::new(),
                stock: None,
            },
            |v| VariantRef {
                id: v.id,
                name: v.name,
                stock: v.stock.as_ref().map(StockDto::units),
            },
        );

        Self::from_server(
            dto.id,
            ProductRef {
                id: dto.product.id,
                name: dto.product.name,
            },
            variant,
            quantity,
            unit_price,
            subtotal,
        )
    }
}

/// `data` of a successful `PUT cart/details/{lineId}`.
///
/// Every field is optional; missing values are derived from what was sent.
#[derive(Debug, Default, Deserialize)]
pub struct LineUpdateDto {
    #[serde(default, alias = "cantidad")]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default, alias = "precio", alias = "unitPrice")]
    pub unit_price: Option<Decimal>,
}

impl LineUpdateDto {
    /// Fill in the blanks using the quantity that was sent and the unit price
    /// the line had when it was sent.
    #[must_use]
    pub fn into_reconciliation(self, sent: Quantity, unit_price: Decimal) -> LineReconciliation {
        let quantity = self.quantity.map_or(sent, Quantity::authoritative);
        let price = self.unit_price.unwrap_or(unit_price);
        LineReconciliation {
            quantity,
            subtotal: self
                .subtotal
                .unwrap_or_else(|| line_subtotal(price, quantity)),
            unit_price: self.unit_price,
        }
    }
}

/// Body of `GET carrito/cantidad/{cartId}`.
#[derive(Debug, Deserialize)]
pub struct CartCountDto {
    #[serde(alias = "totalItems", alias = "cantidad")]
    pub total_items: u32,
}
