//! Login and logout.
//!
//! Logins post to the API anonymously and install the returned grant in the
//! session. Password logins with "remember me" persist for a week; plain and
//! federated logins for a day.

use mely_core::Role;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::session::{Persistence, TokenGrant};
use crate::transport::request::REFRESH_TOKEN_ID_HEADER;
use crate::transport::{ApiRequest, AuthenticatedTransport};

/// Account operations for the current session.
#[derive(Debug, Clone)]
pub struct Account {
    transport: AuthenticatedTransport,
}

impl Account {
    #[must_use]
    pub const fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    /// Sign in with username and password.
    ///
    /// Returns the role of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationRejected` for wrong credentials and
    /// `ApiError::Session` if the grant lacks a credential field.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
        remember_me: bool,
    ) -> Result<Role> {
        let request = ApiRequest::post("login").anonymous().json(serde_json::json!({
            "username": username,
            "password": password.expose_secret(),
            "remember_me": remember_me,
        }));

        let persistence = if remember_me {
            Persistence::Remembered
        } else {
            Persistence::Session
        };
        self.complete_login(&request, persistence).await
    }

    /// Sign in with an identity-provider token.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    #[instrument(skip(self, id_token))]
    pub async fn federated_login(&self, id_token: &SecretString) -> Result<Role> {
        let request = ApiRequest::post("google-login")
            .anonymous()
            .json(serde_json::json!({ "id_token": id_token.expose_secret() }));
        self.complete_login(&request, Persistence::Session).await
    }

    async fn complete_login(&self, request: &ApiRequest, persistence: Persistence) -> Result<Role> {
        let grant: TokenGrant = self.transport.call_json(request).await?;
        let session = self.transport.session();
        session.install(grant, persistence)?;

        let role = session.access_claims().map_or_else(
            || {
                warn!("Access credential carries no readable role");
                Role::Guest
            },
            |claims| claims.role,
        );
        info!(%role, "Signed in");
        Ok(role)
    }

    /// Sign out.
    ///
    /// The backend is told to revoke the refresh credential on a best-effort
    /// basis; the local session is cleared whatever the outcome.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let session = self.transport.session();
        if let Some(refresh_id) = session.refresh_token_id() {
            let request = ApiRequest::post("logout").header(REFRESH_TOKEN_ID_HEADER, &refresh_id);
            if let Err(e) = self.transport.call_empty(&request).await {
                warn!(error = %e, "Server-side logout failed");
            }
        }
        session.clear();
        info!("Signed out");
    }

    /// Role of the current session, `Guest` when signed out.
    #[must_use]
    pub fn role(&self) -> Role {
        self.transport
            .session()
            .access_claims()
            .map(|claims| claims.role)
            .unwrap_or_default()
    }
}
