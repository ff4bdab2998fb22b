//! Delivery address commands.

use std::sync::Arc;

use mely_client::Storefront;
use mely_client::addresses::{Address, AddressForm};
use mely_client::notify::{AlwaysConfirm, Confirmer};
use mely_core::AddressId;

use super::{Output, PromptConfirmer};

fn render(addresses: &[Address]) -> String {
    if addresses.is_empty() {
        return "No saved addresses".to_string();
    }
    addresses
        .iter()
        .map(|address| {
            let marker = if address.selected { "*" } else { " " };
            format!("{marker} #{:<4} {}", address.id, address.place)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn list(storefront: &Storefront, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let addresses = storefront.addresses().list().await?;
    output.emit(&addresses, || render(&addresses));
    Ok(())
}

pub async fn add(
    storefront: &Storefront,
    form: &AddressForm,
) -> Result<(), Box<dyn std::error::Error>> {
    storefront.addresses().create(form).await?;
    tracing::info!(address = %form, "Address saved");
    Ok(())
}

pub async fn edit(
    storefront: &Storefront,
    address: AddressId,
    form: &AddressForm,
) -> Result<(), Box<dyn std::error::Error>> {
    storefront.addresses().update(address, form).await?;
    tracing::info!(%address, "Address updated");
    Ok(())
}

pub async fn select(
    storefront: &Storefront,
    address: AddressId,
) -> Result<(), Box<dyn std::error::Error>> {
    storefront.addresses().select(address).await?;
    tracing::info!(%address, "Orders will ship to this address");
    Ok(())
}

/// Delete an address, asking first unless `yes` is set.
pub async fn remove(
    storefront: &Storefront,
    address: AddressId,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let confirmer: Arc<dyn Confirmer> = if yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(PromptConfirmer)
    };
    if !confirmer
        .confirm("Delete address", &format!("Delete address #{address}?"))
        .await
    {
        tracing::info!(%address, "Kept the address");
        return Ok(());
    }
    storefront.addresses().delete(address).await?;
    tracing::info!(%address, "Address deleted");
    Ok(())
}
