//! Order commands.

use std::path::Path;

use mely_client::Storefront;
use mely_client::orders::{OrderSummary, PaymentMethod};
use mely_client::transport::Attachment;
use mely_core::{OrderId, Price};

use super::{CliError, Output};

fn render(orders: &[OrderSummary]) -> String {
    if orders.is_empty() {
        return "No orders yet".to_string();
    }
    orders
        .iter()
        .map(|order| {
            format!(
                "#{:<6} {:<12} {:<10} {}",
                order.id,
                order.placed_at,
                order.status,
                Price::store(order.total)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn list(storefront: &Storefront, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let orders = storefront.orders().list().await?;
    output.emit(&orders, || render(&orders));
    Ok(())
}

pub async fn cancel(storefront: &Storefront, order: OrderId) -> Result<(), Box<dyn std::error::Error>> {
    storefront.orders().cancel(order).await?;
    tracing::info!(%order, "Order cancelled");
    Ok(())
}

/// Guess the MIME type of a receipt from its extension.
fn mime_type(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

pub async fn upload_receipt(
    storefront: &Storefront,
    order: OrderId,
    method: &str,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let method: PaymentMethod = method.parse().map_err(CliError::InvalidArgument)?;
    let bytes = tokio::fs::read(file).await?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("receipt")
        .to_string();

    let receipt = Attachment {
        file_name,
        mime_type: mime_type(file),
        bytes,
    };
    storefront
        .orders()
        .upload_receipt(order, method, receipt)
        .await?;
    tracing::info!(%order, "Receipt uploaded");
    Ok(())
}
