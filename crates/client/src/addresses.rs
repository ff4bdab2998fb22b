//! Delivery addresses of the signed-in customer.
//!
//! Orders ship to Shalom agencies, so an address is a department, province
//! and district plus the agency's street address. One address is selected
//! as the delivery target at a time.

use mely_core::AddressId;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::catalog::flag;
use crate::error::Result;
use crate::transport::request::REFRESH_TOKEN_ID_HEADER;
use crate::transport::{ApiRequest, AuthenticatedTransport};

/// A saved delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(alias = "idDireccion")]
    pub id: AddressId,
    #[serde(flatten)]
    pub place: AddressForm,
    /// Whether this is the address orders ship to.
    #[serde(default, alias = "estado", deserialize_with = "flag")]
    pub selected: bool,
}

/// Fields of an address as submitted on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressForm {
    #[serde(rename = "departamento")]
    pub department: String,
    #[serde(rename = "provincia")]
    pub province: String,
    #[serde(rename = "distrito")]
    pub district: String,
    /// Street address of the Shalom agency.
    #[serde(rename = "direccion_shalom")]
    pub agency: String,
}

impl AddressForm {
    fn trimmed(&self) -> Self {
        Self {
            department: self.department.trim().to_string(),
            province: self.province.trim().to_string(),
            district: self.district.trim().to_string(),
            agency: self.agency.trim().to_string(),
        }
    }
}

impl std::fmt::Display for AddressForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} - {}, {}",
            self.agency, self.district, self.province, self.department
        )
    }
}

#[derive(Debug, Deserialize)]
struct AddressList {
    #[serde(alias = "data")]
    directions: Vec<Address>,
}

/// Address endpoints.
#[derive(Debug, Clone)]
pub struct Addresses {
    transport: AuthenticatedTransport,
}

impl Addresses {
    #[must_use]
    pub const fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Saved addresses.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Address>> {
        let list: AddressList = self
            .transport
            .call_envelope(&ApiRequest::get("directions"))
            .await?;
        Ok(list.directions)
    }

    /// The address orders currently ship to, if one is selected.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is malformed.
    pub async fn selected(&self) -> Result<Option<Address>> {
        Ok(self.list().await?.into_iter().find(|a| a.selected))
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn create(&self, form: &AddressForm) -> Result<()> {
        let request = ApiRequest::post("directions").json(serde_json::to_value(form.trimmed())?);
        self.transport.call_empty(&request).await
    }

    /// Replace the fields of an address.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn update(&self, address: AddressId, form: &AddressForm) -> Result<()> {
        let request = ApiRequest::put(format!("directions/{address}"))
            .json(serde_json::to_value(form.trimmed())?);
        self.transport.call_empty(&request).await
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn delete(&self, address: AddressId) -> Result<()> {
        let mut request = ApiRequest::delete(format!("directions/{address}"));
        if let Some(refresh_id) = self.transport.session().refresh_token_id() {
            request = request.header(REFRESH_TOKEN_ID_HEADER, &refresh_id);
        }
        self.transport.call_empty(&request).await
    }

    /// Make `address` the delivery target.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` if the backend refuses.
    #[instrument(skip(self))]
    pub async fn select(&self, address: AddressId) -> Result<()> {
        self.transport
            .call_empty(&ApiRequest::patch(format!("directions/{address}/select")))
            .await
    }
}
