//! Catalog browsing.

use mely_client::Storefront;
use mely_client::catalog::{Category, Product, ProductFilter, ProductPage, Subcategory};
use mely_core::{CategoryId, Price};

use super::Output;

fn render_categories(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "No categories".to_string();
    }
    categories
        .iter()
        .map(|category| {
            let status = if category.active { "" } else { "  (inactive)" };
            format!("#{:<4} {}{status}", category.id, category.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_subcategories(subcategories: &[Subcategory]) -> String {
    if subcategories.is_empty() {
        return "No subcategories".to_string();
    }
    subcategories
        .iter()
        .map(|sub| match &sub.category_name {
            Some(parent) => format!("#{:<4} {} ({parent})", sub.id, sub.name),
            None => format!("#{:<4} {}", sub.id, sub.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_product(product: &Product) -> String {
    let models = product
        .models
        .iter()
        .map(|model| match model.stock {
            Some(stock) => format!("{} [{stock}]", model.name),
            None => model.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "#{:<6} {:<30} {:>10}  {models}",
        product.id,
        product.name,
        Price::store(product.price).to_string()
    )
}

fn render_page(page: &ProductPage) -> String {
    if page.products.is_empty() {
        return "No products match".to_string();
    }
    let mut lines: Vec<String> = page.products.iter().map(render_product).collect();
    lines.push(format!("Page {} of {}", page.current_page, page.last_page));
    lines.join("\n")
}

pub async fn categories(
    storefront: &Storefront,
    all: bool,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let categories = if all {
        storefront.catalog_admin().categories().await?
    } else {
        storefront.catalog().categories().await?
    };
    output.emit(&categories, || render_categories(&categories));
    Ok(())
}

pub async fn subcategories(
    storefront: &Storefront,
    category: Option<CategoryId>,
    all: bool,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let subcategories = match (all, category) {
        (false, Some(category)) => storefront.catalog().subcategories(category).await?,
        (_, category) => storefront.catalog_admin().subcategories(category).await?,
    };
    output.emit(&subcategories, || render_subcategories(&subcategories));
    Ok(())
}

pub async fn products(
    storefront: &Storefront,
    page: u32,
    filter: &ProductFilter,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = storefront.catalog().products(page, filter).await?;
    output.emit(&page, || render_page(&page));
    Ok(())
}
