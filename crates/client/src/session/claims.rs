//! Claim extraction from session credentials.
//!
//! Credentials are signed tokens in the usual three-segment
//! `header.payload.signature` form. The client only reads the payload; it
//! never validates signatures, which is the server's job.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use mely_core::{CartId, Role};
use serde::Deserialize;

/// Read-only view over the claims of a credential.
///
/// Recompute it from the session for every logical operation: the underlying
/// credential may rotate at any renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user) identifier, as the server spelled it.
    pub subject: Option<String>,
    /// Role of the signed-in user.
    pub role: Role,
    /// Cart owned by the session, if the backend assigned one.
    pub cart_id: Option<CartId>,
    /// Expiry of the credential, when the token declares one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Claims {
    /// Whether the credential declares an expiry that has already passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Why a credential could not be decoded into [`Claims`].
#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token is not in header.payload.signature form")]
    Malformed,
    #[error("payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("payload is not a valid claims object: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default, alias = "idUsuario", alias = "user_id")]
    sub: Option<serde_json::Value>,
    #[serde(default, alias = "rol")]
    role: Option<String>,
    #[serde(default, alias = "idCarrito", alias = "cartId")]
    cart_id: Option<CartId>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Decode the payload segment of a credential.
///
/// # Errors
///
/// Returns `ClaimsError` if the token does not have three segments, the
/// payload is not base64url, or the payload is not a claims object.
pub fn decode(token: &str) -> Result<Claims, ClaimsError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Malformed);
    };

    // Some issuers pad their segments.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let raw: RawClaims = serde_json::from_slice(&bytes)?;

    let subject = raw.sub.and_then(|value| match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(Claims {
        subject,
        role: raw.role.as_deref().map_or_else(Role::default, parse_role),
        cart_id: raw.cart_id,
        expires_at: raw.exp.and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

/// Roles outside the known set read as `Guest` so the rest of the claims
/// (cart id in particular) stay usable.
fn parse_role(raw: &str) -> Role {
    raw.trim().to_lowercase().parse().unwrap_or_else(|_| {
        tracing::debug!(role = raw, "Unknown role claim, treating as guest");
        Role::Guest
    })
}
