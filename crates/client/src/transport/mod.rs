//! Authenticated HTTP transport.
//!
//! Every call against the commerce API goes through [`AuthenticatedTransport`].
//! It attaches the bearer credential, renews it when the backend answers 401,
//! replays the original request once, watches for the maintenance signal and
//! normalizes failures into [`ApiError`].
//!
//! # Renewal
//!
//! Renewal is single-flight: all requests that were sent with the same
//! credential generation and got a 401 share one call to the renewal endpoint
//! and observe the same outcome. See [`renewal`] for details.

pub mod renewal;
pub mod request;

pub use request::{ApiRequest, ApiResponse, Attachment, RequestBody};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::session::SessionStore;

use renewal::RenewalSlot;
use request::REQUEST_ID_HEADER;

/// Callback invoked with `(active, message)` when maintenance mode toggles.
pub type MaintenanceCallback = Arc<dyn Fn(bool, &str) + Send + Sync>;

/// HTTP client that keeps the session's credentials fresh.
///
/// Cheap to clone; clones share the HTTP connection pool, the session and the
/// renewal slot.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
    /// Held for the whole renewal call; waiting on it is the single-flight join.
    renewal: Mutex<RenewalSlot>,
    /// Number of renewal calls that have completed, whatever their outcome.
    renewals_finished: AtomicU64,
    maintenance_callback: RwLock<Option<MaintenanceCallback>>,
    maintenance_active: AtomicBool,
}

impl AuthenticatedTransport {
    /// Create a transport for the configured API.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NetworkUnavailable` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(TransportInner {
                client,
                base_url: config.api_base_url.clone(),
                session,
                renewal: Mutex::new(RenewalSlot::default()),
                renewals_finished: AtomicU64::new(0),
                maintenance_callback: RwLock::new(None),
                maintenance_active: AtomicBool::new(false),
            }),
        })
    }

    /// The session this transport authenticates with.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    /// Register the maintenance callback, replacing any previous one.
    pub fn set_maintenance_callback<F>(&self, callback: F)
    where
        F: Fn(bool, &str) + Send + Sync + 'static,
    {
        *self
            .inner
            .maintenance_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Whether the last response observed carried the maintenance signal.
    #[must_use]
    pub fn maintenance_active(&self) -> bool {
        self.inner.maintenance_active.load(Ordering::Acquire)
    }

    /// Issue a request, renewing the credential and replaying once on 401.
    ///
    /// Returns the response for any 2xx status.
    ///
    /// # Errors
    ///
    /// - `ApiError::NetworkUnavailable` if no response was received
    /// - `ApiError::MustReauthenticate` if renewal failed (the session is cleared)
    /// - `ApiError::AuthExpired` if the replay was rejected again
    /// - `ApiError::MaintenanceActive` if the backend is in maintenance mode
    /// - `ApiError::ValidationRejected` for any other non-2xx response
    #[instrument(
        skip(self, request),
        fields(method = %request.method, path = %request.path, request_id = %request.request_id)
    )]
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        if !request.authenticated {
            let response = self.dispatch(request, None).await?;
            return Self::finish(response);
        }

        let snapshot = self.inner.session.access_snapshot();
        let response = self
            .dispatch(request, snapshot.access_token.as_ref())
            .await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Self::finish(response);
        }

        debug!(generation = snapshot.generation, "Access credential rejected");
        self.renew_after(snapshot.generation).await?;

        let replay = self.inner.session.access_snapshot();
        let response = self.dispatch(request, replay.access_token.as_ref()).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!("Replay rejected after renewal");
            return Err(ApiError::AuthExpired);
        }
        Self::finish(response)
    }

    /// Issue a request and decode the `data` member of a `{success, data}` envelope.
    ///
    /// Bodies without a `data` member are decoded whole. `success: false` is
    /// a rejection even when the status is 2xx.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus `ApiError::Decode`.
    pub async fn call_envelope<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        let mut body = response.json_value();

        if body.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
            return Err(ApiError::ValidationRejected {
                status: response.status,
                message: response.error_message(),
            });
        }

        let data = match body.get_mut("data") {
            Some(data) => data.take(),
            None => body,
        };
        Ok(serde_json::from_value(data)?)
    }

    /// Issue a request and decode the whole response body.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus `ApiError::Decode`.
    pub async fn call_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Issue a request whose response carries no data worth decoding.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns; `success: false` is a rejection.
    pub async fn call_empty(&self, request: &ApiRequest) -> Result<()> {
        self.call_envelope::<serde_json::Value>(request)
            .await
            .map(|_| ())
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse> {
        let mut url = self.inner.base_url.join(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, request.request_id.to_string());

        for (name, value) in &request.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart { fields, files } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                for (name, attachment) in files {
                    let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
                        .file_name(attachment.file_name.clone());
                    let part = match &attachment.mime_type {
                        Some(mime) => part.mime_str(mime)?,
                        None => part,
                    };
                    form = form.part(name.clone(), part);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        let response = ApiResponse {
            status,
            headers,
            body,
        };
        self.observe_maintenance(&response);
        Ok(response)
    }

    /// Map a received response to success or a normalized error.
    /// Map a final response to a result. A 2xx carrying the maintenance
    /// signal still succeeds; the callback already saw the signal.
    fn finish(response: ApiResponse) -> Result<ApiResponse> {
        if response.status.is_success() {
            return Ok(response);
        }
        if let Some(message) = response.maintenance_message() {
            return Err(ApiError::MaintenanceActive { message });
        }

        let message = response.error_message();
        debug!(status = %response.status, %message, "Request rejected");
        Err(ApiError::ValidationRejected {
            status: response.status,
            message,
        })
    }

    /// Track the maintenance signal across responses and fire the callback.
    fn observe_maintenance(&self, response: &ApiResponse) {
        let callback = self
            .inner
            .maintenance_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match response.maintenance_message() {
            Some(message) => {
                if !self.inner.maintenance_active.swap(true, Ordering::AcqRel) {
                    info!(%message, "Maintenance mode on");
                }
                if let Some(callback) = callback {
                    callback(true, &message);
                }
            }
            None => {
                if self.inner.maintenance_active.swap(false, Ordering::AcqRel) {
                    info!("Maintenance mode off");
                    if let Some(callback) = callback {
                        callback(false, "");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("base_url", &self.inner.base_url.as_str())
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}
