//! Product catalog.
//!
//! Browsing (`categories`, `subcategories`, `products`) is public and sent
//! without credentials. Category management needs an administrator session
//! and goes through [`CatalogAdmin`].

use mely_core::{CategoryId, ProductId, SubcategoryId, VariantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::cart::wire::StockDto;
use crate::error::Result;
use crate::transport::{ApiRequest, Attachment, AuthenticatedTransport};

/// Top-level product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(alias = "idCategoria")]
    pub id: CategoryId,
    #[serde(alias = "nombreCategoria")]
    pub name: String,
    /// Image URL, when one was uploaded.
    #[serde(default, alias = "imagen")]
    pub image: Option<String>,
    #[serde(default = "active", alias = "estado", deserialize_with = "flag")]
    pub active: bool,
}

/// Subcategory, optionally carrying its parent's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    #[serde(alias = "idSubCategoria")]
    pub id: SubcategoryId,
    #[serde(alias = "nombreSubCategoria")]
    pub name: String,
    #[serde(default, alias = "idCategoria")]
    pub category_id: Option<CategoryId>,
    #[serde(default, alias = "nombreCategoria")]
    pub category_name: Option<String>,
    #[serde(default = "active", alias = "estado", deserialize_with = "flag")]
    pub active: bool,
}

/// Product as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(alias = "idProducto")]
    pub id: ProductId,
    #[serde(alias = "nombreProducto")]
    pub name: String,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "precio")]
    pub price: Decimal,
    #[serde(default, alias = "caracteristicas")]
    pub features: Option<String>,
    #[serde(default, alias = "modelos")]
    pub models: Vec<ProductModel>,
}

/// One purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductModel {
    #[serde(alias = "idModelo")]
    pub id: VariantId,
    #[serde(alias = "nombreModelo")]
    pub name: String,
    #[serde(default, deserialize_with = "stock_units")]
    pub stock: Option<u32>,
    #[serde(default, alias = "imagenes")]
    pub images: Vec<ProductImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    #[serde(default, alias = "idImagen")]
    pub id: Option<i64>,
    #[serde(alias = "urlImagen")]
    pub url: String,
}

/// One page of `GET products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    #[serde(rename = "data")]
    pub products: Vec<Product>,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "first_page")]
    pub last_page: u32,
}

impl ProductPage {
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.current_page < self.last_page
    }
}

/// Filters for the product listing. Empty fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<CategoryId>,
    pub subcategory: Option<SubcategoryId>,
    pub name: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl ProductFilter {
    fn to_request(&self, page: u32) -> ApiRequest {
        let mut request = ApiRequest::get("products")
            .anonymous()
            .query("page", page.max(1));
        if let Some(category) = self.category {
            request = request.query("category_id", category);
        }
        if let Some(subcategory) = self.subcategory {
            request = request.query("subcategory_id", subcategory);
        }
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            request = request.query("name", name);
        }
        if let Some(min) = self.min_price {
            request = request.query("min_price", min);
        }
        if let Some(max) = self.max_price {
            request = request.query("max_price", max);
        }
        request
    }
}

const fn active() -> bool {
    true
}

const fn first_page() -> u32 {
    1
}

/// `estado` arrives as a boolean, as 0/1, or as text.
pub(crate) fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(i64),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Number(value) => value != 0,
        Flag::Text(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "activo" | "activa"
        ),
    })
}

fn stock_units<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u32>, D::Error> {
    Ok(Option::<StockDto>::deserialize(deserializer)?.map(|stock| stock.units()))
}

/// Public catalog endpoints.
#[derive(Debug, Clone)]
pub struct Catalog {
    transport: AuthenticatedTransport,
}

impl Catalog {
    #[must_use]
    pub const fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Active categories.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.transport
            .call_envelope(&ApiRequest::get("categories").anonymous())
            .await
    }

    /// Subcategories of one category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn subcategories(&self, category: CategoryId) -> Result<Vec<Subcategory>> {
        let request = ApiRequest::get("subcategories")
            .anonymous()
            .query("category_id", category);
        self.transport.call_envelope(&request).await
    }

    /// One page of products matching `filter`. Pages start at 1.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn products(&self, page: u32, filter: &ProductFilter) -> Result<ProductPage> {
        self.transport.call_envelope(&filter.to_request(page)).await
    }
}

/// Category and subcategory management. Needs an administrator session.
#[derive(Debug, Clone)]
pub struct CatalogAdmin {
    transport: AuthenticatedTransport,
}

impl CatalogAdmin {
    #[must_use]
    pub const fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Every category, inactive ones included.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.transport
            .call_envelope(&ApiRequest::get("categories"))
            .await
    }

    /// Create a category, with an optional image.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self, image))]
    pub async fn create_category(&self, name: &str, image: Option<Attachment>) -> Result<()> {
        let request = ApiRequest::post("categories").multipart(
            vec![("nombreCategoria".to_string(), name.trim().to_string())],
            image
                .map(|image| ("imagen".to_string(), image))
                .into_iter()
                .collect(),
        );
        self.transport.call_empty(&request).await
    }

    /// Rename a category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn rename_category(&self, category: CategoryId, name: &str) -> Result<()> {
        let request = ApiRequest::put(format!("categories/{category}"))
            .json(json!({ "nombreCategoria": name.trim() }));
        self.transport.call_empty(&request).await
    }

    /// Activate or deactivate a category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn set_category_active(&self, category: CategoryId, active: bool) -> Result<()> {
        let request = ApiRequest::patch(format!("categories/{category}/status"))
            .json(json!({ "active": active }));
        self.transport.call_empty(&request).await
    }

    /// Every subcategory, optionally limited to one category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn subcategories(&self, category: Option<CategoryId>) -> Result<Vec<Subcategory>> {
        let mut request = ApiRequest::get("subcategories/admin");
        if let Some(category) = category {
            request = request.query("category_id", category);
        }
        self.transport.call_envelope(&request).await
    }

    /// Create a subcategory under `category`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn create_subcategory(&self, category: CategoryId, name: &str) -> Result<()> {
        let request = ApiRequest::post("subcategories").json(subcategory_body(category, name));
        self.transport.call_empty(&request).await
    }

    /// Rename a subcategory or move it to another category.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn update_subcategory(
        &self,
        subcategory: SubcategoryId,
        category: CategoryId,
        name: &str,
    ) -> Result<()> {
        let request = ApiRequest::put(format!("subcategories/{subcategory}"))
            .json(subcategory_body(category, name));
        self.transport.call_empty(&request).await
    }

    /// Activate or deactivate a subcategory.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn set_subcategory_active(
        &self,
        subcategory: SubcategoryId,
        active: bool,
    ) -> Result<()> {
        let request = ApiRequest::patch(format!("subcategories/{subcategory}/status"))
            .json(json!({ "active": active }));
        self.transport.call_empty(&request).await
    }
}

fn subcategory_body(category: CategoryId, name: &str) -> serde_json::Value {
    json!({ "nombreSubCategoria": name.trim(), "idCategoria": category })
}
