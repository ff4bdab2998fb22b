//! Error taxonomy for calls against the commerce API.
//!
//! Every failure that crosses the transport boundary is normalized into
//! [`ApiError`], so callers such as the cart sync engine decide between
//! "retry-worthy" and "show message" without looking at status codes.

use reqwest::StatusCode;
use thiserror::Error;

use crate::session::SessionError;

/// Errors surfaced by the authenticated transport and the typed API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The replayed request was rejected again after a successful renewal.
    #[error("access credential rejected after renewal")]
    AuthExpired,

    /// Renewal failed or no refresh credential exists; the session was cleared.
    #[error("session expired, please sign in again")]
    MustReauthenticate,

    /// No response was received (connect failure, timeout, broken body).
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The server answered but rejected the request.
    #[error("request rejected ({status}): {message}")]
    ValidationRejected {
        /// HTTP status of the rejection.
        status: StatusCode,
        /// Message extracted from the response payload.
        message: String,
    },

    /// The backend reported maintenance mode.
    #[error("service under maintenance: {message}")]
    MaintenanceActive {
        /// Message supplied with the maintenance signal.
        message: String,
    },

    /// The session carries no cart identifier.
    #[error("no active cart for this session")]
    NoActiveCart,

    /// A request path could not be resolved against the API base URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// A successful response could not be decoded.
    #[error("unexpected response payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The session store rejected an operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl ApiError {
    /// Whether retrying the same call later may succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }

    /// Whether the caller chain should send the user back to the login screen.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::MustReauthenticate | Self::AuthExpired)
    }

    /// Text suitable for a user-facing notification.
    ///
    /// Server rejections are shown verbatim; everything else gets a stable
    /// message that does not leak internal details.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationRejected { message, .. } | Self::MaintenanceActive { message } => {
                message.clone()
            }
            Self::NetworkUnavailable(_) => {
                "Could not reach the store. Check your connection and try again.".to_string()
            }
            Self::AuthExpired | Self::MustReauthenticate => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::NoActiveCart => "No cart found. Please sign in.".to_string(),
            Self::InvalidEndpoint(_) | Self::Decode(_) | Self::Session(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        // Any reqwest error reaching this point happened before a complete
        // response was read.
        Self::NetworkUnavailable(err.to_string())
    }
}

/// Result type alias for `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;
