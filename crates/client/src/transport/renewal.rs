//! Single-flight credential renewal.
//!
//! When a request comes back 401 the transport calls
//! [`AuthenticatedTransport::renew_after`] with the credential generation the
//! request was sent with. The renewal slot is a `tokio::sync::Mutex` held for
//! the whole renewal call, so concurrent callers queue on it. Once inside,
//! a caller first checks whether the generation it saw has already been
//! served, and if so takes the recorded outcome instead of renewing again.
//!
//! `Renewed` and `Failed` settle a generation for good. `Maintenance` and
//! `Unreachable` are shared only with callers that were already waiting when
//! the renewal finished; a later 401 on the same generation tries again.
//!
//! Renewal endpoint: `POST auth/refresh` with body `{"refresh_token": ...}`
//! and the `X-Refresh-Token-ID` header. The response is a token grant.

use std::sync::atomic::Ordering;

use secrecy::ExposeSecret;
use tracing::{info, instrument, warn};

use super::request::{ApiRequest, REFRESH_TOKEN_ID_HEADER};
use super::AuthenticatedTransport;
use crate::error::{ApiError, Result};
use crate::session::TokenGrant;

/// Path of the renewal endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "auth/refresh";

/// Result of a renewal, shared with every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// New credentials are installed.
    Renewed,
    /// The refresh credential was refused or absent; the session is cleared.
    Failed,
    /// The renewal endpoint answered with the maintenance signal.
    Maintenance(String),
    /// The renewal call got no response.
    Unreachable(String),
}

impl RenewalOutcome {
    /// Whether the outcome holds for every later caller on the same generation.
    const fn is_settled(&self) -> bool {
        matches!(self, Self::Renewed | Self::Failed)
    }

    fn into_result(self) -> Result<()> {
        match self {
            Self::Renewed => Ok(()),
            Self::Failed => Err(ApiError::MustReauthenticate),
            Self::Maintenance(message) => Err(ApiError::MaintenanceActive { message }),
            Self::Unreachable(reason) => Err(ApiError::NetworkUnavailable(reason)),
        }
    }
}

/// Outcome of the most recent renewal, keyed by the generation it replaced.
#[derive(Debug, Default)]
pub(super) struct RenewalSlot {
    served: Option<Served>,
}

#[derive(Debug)]
struct Served {
    generation: u64,
    /// Position of this renewal in the transport's completion count.
    attempt: u64,
    outcome: RenewalOutcome,
}

impl Served {
    /// Whether a caller that saw `seen_generation` and `finished_before`
    /// completed renewals should take this outcome instead of renewing.
    const fn applies_to(&self, seen_generation: u64, finished_before: u64) -> bool {
        self.generation == seen_generation
            && (self.outcome.is_settled() || self.attempt > finished_before)
    }
}

impl AuthenticatedTransport {
    /// Renew the credential set that was current at `seen_generation`.
    ///
    /// Callers that arrive while a renewal for the same generation is running
    /// wait for it and get its outcome.
    ///
    /// # Errors
    ///
    /// - `ApiError::MustReauthenticate` if renewal failed or no session exists
    /// - `ApiError::MaintenanceActive` if the backend is in maintenance mode
    /// - `ApiError::NetworkUnavailable` if the renewal call got no response
    #[instrument(skip(self))]
    pub async fn renew_after(&self, seen_generation: u64) -> Result<()> {
        let finished_before = self.inner.renewals_finished.load(Ordering::Acquire);
        let mut slot = self.inner.renewal.lock().await;

        if let Some(served) = &slot.served
            && served.applies_to(seen_generation, finished_before)
        {
            return served.outcome.clone().into_result();
        }

        let session = &self.inner.session;
        if session.generation() != seen_generation {
            // Credentials changed under us (login, logout or an unrelated renewal).
            return if session.is_authenticated() {
                Ok(())
            } else {
                Err(ApiError::MustReauthenticate)
            };
        }

        let outcome = self.perform_renewal().await;
        let attempt = self.inner.renewals_finished.fetch_add(1, Ordering::AcqRel) + 1;
        slot.served = Some(Served {
            generation: seen_generation,
            attempt,
            outcome: outcome.clone(),
        });
        drop(slot);

        outcome.into_result()
    }

    async fn perform_renewal(&self) -> RenewalOutcome {
        let session = &self.inner.session;
        let Some(credentials) = session.credentials() else {
            info!("No refresh credential available");
            session.clear();
            return RenewalOutcome::Failed;
        };

        let request = ApiRequest::post(REFRESH_PATH)
            .anonymous()
            .header(REFRESH_TOKEN_ID_HEADER, credentials.refresh_token_id())
            .json(serde_json::json!({
                "refresh_token": credentials.refresh_token().expose_secret(),
            }));

        let response = match self.dispatch(&request, None).await {
            Ok(response) => response,
            Err(ApiError::NetworkUnavailable(reason)) => {
                warn!(%reason, "Renewal call got no response");
                return RenewalOutcome::Unreachable(reason);
            }
            Err(e) => {
                warn!(error = %e, "Renewal call could not be issued");
                session.clear();
                return RenewalOutcome::Failed;
            }
        };

        if !response.status.is_success() {
            if let Some(message) = response.maintenance_message() {
                return RenewalOutcome::Maintenance(message);
            }
            warn!(status = %response.status, "Refresh credential refused, clearing session");
            session.clear();
            return RenewalOutcome::Failed;
        }

        let installed = serde_json::from_slice::<TokenGrant>(&response.body)
            .map_err(ApiError::from)
            .and_then(|grant| session.set_credentials(grant).map_err(ApiError::from));

        match installed {
            Ok(()) => {
                info!(generation = session.generation(), "Credentials renewed");
                RenewalOutcome::Renewed
            }
            Err(e) => {
                warn!(error = %e, "Renewal returned an unusable grant, clearing session");
                session.clear();
                RenewalOutcome::Failed
            }
        }
    }
}
