//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MELY_API_BASE_URL` - Base URL of the commerce API (e.g., `https://tienda.example/api`)
//!
//! ## Optional
//! - `MELY_REQUEST_TIMEOUT_SECS` - Upper bound for every HTTP call (default: 30)
//! - `MELY_CART_DEBOUNCE_MS` - Quiescence window for cart quantity edits (default: 800)
//! - `MELY_CREDENTIALS_PATH` - File used to persist the session between runs
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: &str = "30";
const DEFAULT_DEBOUNCE_MS: &str = "800";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every API path is resolved against.
    pub api_base_url: Url,
    /// Upper bound after which a call is treated as a network failure.
    pub request_timeout: Duration,
    /// Quiescence window applied to cart quantity edits.
    pub cart_debounce: Duration,
    /// Where to persist credentials; `None` keeps the session in memory only.
    pub credentials_path: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "production", "staging")
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Build a configuration for the given API base URL with default timings.
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url),
            request_timeout: Duration::from_secs(30),
            cart_debounce: Duration::from_millis(800),
            credentials_path: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = get_required_env("MELY_API_BASE_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MELY_API_BASE_URL".to_string(), e.to_string())
            })?;
        let timeout_secs = get_env_or_default("MELY_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MELY_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        let debounce_ms = get_env_or_default("MELY_CART_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("MELY_CART_DEBOUNCE_MS".to_string(), e.to_string())
            })?;

        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "MELY_REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            api_base_url: normalize_base_url(api_base_url),
            request_timeout: Duration::from_secs(timeout_secs),
            cart_debounce: Duration::from_millis(debounce_ms),
            credentials_path: get_optional_env("MELY_CREDENTIALS_PATH").map(PathBuf::from),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

/// Ensure the base URL ends with a slash so relative joins keep its path.
fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
