//! Role and status enums.
//!
//! The commerce API was written for a Spanish-language store, so wire values
//! arrive either in English or in Spanish (`cliente`, `pendiente`, ...). Both
//! spellings deserialize to the same variant; serialization always uses the
//! English name.

use serde::{Deserialize, Serialize};

/// Role carried in the session credential claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Anonymous visitor or a credential without a role claim.
    #[default]
    #[serde(alias = "invitado")]
    Guest,
    /// Shopper with a cart and order history.
    #[serde(alias = "cliente")]
    Customer,
    /// Store administrator.
    #[serde(alias = "administrador")]
    Admin,
}

impl Role {
    /// Path a freshly logged-in user should land on.
    #[must_use]
    pub const fn landing_path(self) -> &'static str {
        match self {
            Self::Admin => "/admin",
            Self::Guest | Self::Customer => "/",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Customer => write!(f, "customer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" | "invitado" => Ok(Self::Guest),
            "customer" | "cliente" => Ok(Self::Customer),
            "admin" | "administrador" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// Order lifecycle status as reported by the backend.
///
/// Unknown values are preserved in [`OrderStatus::Other`] so a new backend
/// status never makes an order list undecodable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    /// Whether the customer may still cancel the order.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the order is waiting for a payment receipt.
    #[must_use]
    pub const fn awaits_payment(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl From<&str> for OrderStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pending" | "pendiente" => Self::Pending,
            "paid" | "pagado" => Self::Paid,
            "shipped" | "enviado" => Self::Shipped,
            "delivered" | "entregado" => Self::Delivered,
            "cancelled" | "canceled" | "cancelado" => Self::Cancelled,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_accepts_spanish_aliases() {
        let role: Role = serde_json::from_str("\"cliente\"").unwrap();
        assert_eq!(role, Role::Customer);
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert!(serde_json::from_str::<Role>("\"vendedor\"").is_err());
    }

    #[test]
    fn test_role_landing_path() {
        assert_eq!(Role::Admin.landing_path(), "/admin");
        assert_eq!(Role::Customer.landing_path(), "/");
    }

    #[test]
    fn test_role_from_str_roundtrips_display() {
        for role in [Role::Guest, Role::Customer, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_order_status_aliases() {
        assert_eq!(OrderStatus::from("Pendiente"), OrderStatus::Pending);
        assert_eq!(OrderStatus::from("cancelado"), OrderStatus::Cancelled);
        assert_eq!(
            OrderStatus::from("en revisión"),
            OrderStatus::Other("en revisión".to_string())
        );
    }

    #[test]
    fn test_order_status_serde() {
        let status: OrderStatus = serde_json::from_str("\"pagado\"").unwrap();
        assert_eq!(status, OrderStatus::Paid);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"paid\"");
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
    }
}
