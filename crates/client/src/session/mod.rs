//! Session store: the single owner of the current credential set.
//!
//! The store holds the access credential, the refresh credential and the
//! refresh-credential id, exposes claim extraction, and persists the set to a
//! [`CredentialStore`] so a restart does not force a new login.
//!
//! # Ownership
//!
//! Exactly one `SessionStore` exists per signed-in user. It is shared through
//! `Arc` with the transport (which installs renewed credentials) and with any
//! collaborator that reads claims. Nothing else keeps a copy of the tokens.
//!
//! # Generations
//!
//! Every install or teardown bumps a generation counter. The transport keys
//! its single-flight renewal on the generation a request was sent with, so
//! requests that raced the same expiry share a single renewal.

pub mod claims;
pub mod store;

pub use claims::{Claims, ClaimsError};
pub use store::{
    CredentialStore, DEFAULT_REFRESH_TTL, FileCredentialStore, MemoryCredentialStore,
    REMEMBERED_REFRESH_TTL, StoredCredentials,
};

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur when installing or persisting credentials.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A token grant lacked one of the three credential fields.
    #[error("invalid credential shape: missing {0}")]
    InvalidCredentialShape(&'static str),

    /// The durable store could not be read or written.
    #[error("credential persistence failed: {0}")]
    Persistence(String),
}

/// Token grant as returned by the login, federated-login and renewal endpoints.
///
/// Every field is optional on the wire; [`SessionStore::set_credentials`]
/// rejects grants that are missing any of them.
#[derive(Default, Deserialize)]
pub struct TokenGrant {
    #[serde(default, alias = "accessToken")]
    pub access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "idRefreshToken", alias = "refreshTokenId")]
    pub refresh_token_id: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token_id", &self.refresh_token_id)
            .finish()
    }
}

/// How long the refresh credential of a newly installed set should persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// One day (ordinary and federated logins, renewals of such sessions).
    #[default]
    Session,
    /// One week ("remember me").
    Remembered,
}

impl Persistence {
    const fn ttl(self) -> Duration {
        match self {
            Self::Session => DEFAULT_REFRESH_TTL,
            Self::Remembered => REMEMBERED_REFRESH_TTL,
        }
    }
}

/// A complete credential set. Created only through a validated grant.
#[derive(Clone)]
pub struct CredentialSet {
    access_token: SecretString,
    refresh_token: SecretString,
    refresh_token_id: String,
}

impl CredentialSet {
    /// Access credential attached as the bearer token.
    #[must_use]
    pub const fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    /// Refresh credential used to mint a new access credential.
    #[must_use]
    pub const fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    /// Server-side identifier of the refresh credential.
    #[must_use]
    pub fn refresh_token_id(&self) -> &str {
        &self.refresh_token_id
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_token_id", &self.refresh_token_id)
            .finish()
    }
}

impl TryFrom<TokenGrant> for CredentialSet {
    type Error = SessionError;

    fn try_from(grant: TokenGrant) -> Result<Self, Self::Error> {
        fn required(value: Option<String>, field: &'static str) -> Result<String, SessionError> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(SessionError::InvalidCredentialShape(field))
        }

        Ok(Self {
            access_token: SecretString::from(required(grant.access_token, "access_token")?),
            refresh_token: SecretString::from(required(grant.refresh_token, "refresh_token")?),
            refresh_token_id: required(grant.refresh_token_id, "refresh_token_id")?,
        })
    }
}

/// Point-in-time view of the access credential, tagged with its generation.
#[derive(Clone)]
pub struct AccessSnapshot {
    /// Generation of the credential set this snapshot was taken from.
    pub generation: u64,
    /// Access credential, absent when signed out.
    pub access_token: Option<SecretString>,
}

struct SessionState {
    credentials: Option<CredentialSet>,
    persistence: Persistence,
    generation: u64,
}

/// Owner of the current credential set.
pub struct SessionStore {
    state: RwLock<SessionState>,
    store: Arc<dyn CredentialStore>,
}

impl SessionStore {
    /// Open a session backed by `store`, restoring any persisted credentials.
    ///
    /// Stale or malformed records are discarded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` if the store cannot be read.
    pub fn open(store: Arc<dyn CredentialStore>) -> Result<Self, SessionError> {
        let restored = match store.load()? {
            Some(record) if record.is_stale(Utc::now()) => {
                info!("Discarding expired persisted session");
                store.clear()?;
                None
            }
            Some(record) => {
                let grant = TokenGrant {
                    access_token: Some(record.access_token),
                    refresh_token: Some(record.refresh_token),
                    refresh_token_id: Some(record.refresh_token_id),
                };
                CredentialSet::try_from(grant).ok()
            }
            None => None,
        };

        if restored.is_some() {
            debug!("Restored persisted session");
        }

        Ok(Self {
            state: RwLock::new(SessionState {
                credentials: restored,
                persistence: Persistence::Session,
                generation: 0,
            }),
            store,
        })
    }

    /// Create an empty, memory-only session.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(SessionState {
                credentials: None,
                persistence: Persistence::Session,
                generation: 0,
            }),
            store: Arc::new(MemoryCredentialStore::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new credential set, keeping the current persistence lifetime.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCredentialShape` if any field is missing.
    pub fn set_credentials(&self, grant: TokenGrant) -> Result<(), SessionError> {
        let persistence = self.read().persistence;
        self.install(grant, persistence)
    }

    /// Install a new credential set with an explicit persistence lifetime.
    ///
    /// Persistence failures are logged; the in-memory session stays valid.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidCredentialShape` if any field is missing.
    pub fn install(&self, grant: TokenGrant, persistence: Persistence) -> Result<(), SessionError> {
        let credentials = CredentialSet::try_from(grant)?;

        let record = StoredCredentials {
            access_token: credentials.access_token.expose_secret().to_string(),
            refresh_token: credentials.refresh_token.expose_secret().to_string(),
            refresh_token_id: credentials.refresh_token_id.clone(),
            refresh_expires_at: Utc::now() + persistence.ttl(),
        };

        {
            let mut state = self.write();
            state.credentials = Some(credentials);
            state.persistence = persistence;
            state.generation += 1;
        }

        if let Err(e) = self.store.save(&record) {
            warn!(error = %e, "Failed to persist credentials");
        }
        Ok(())
    }

    /// Destroy all three credential fields. Idempotent.
    pub fn clear(&self) {
        {
            let mut state = self.write();
            if state.credentials.is_some() {
                state.generation += 1;
            }
            state.credentials = None;
        }

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted credentials");
        }
    }

    /// Whether a credential set is installed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().credentials.is_some()
    }

    /// Current credential generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Access credential together with the generation it belongs to.
    #[must_use]
    pub fn access_snapshot(&self) -> AccessSnapshot {
        let state = self.read();
        AccessSnapshot {
            generation: state.generation,
            access_token: state
                .credentials
                .as_ref()
                .map(|c| c.access_token.clone()),
        }
    }

    /// Copy of the full credential set, if any.
    #[must_use]
    pub fn credentials(&self) -> Option<CredentialSet> {
        self.read().credentials.clone()
    }

    /// Identifier of the refresh credential, if any.
    #[must_use]
    pub fn refresh_token_id(&self) -> Option<String> {
        self.read()
            .credentials
            .as_ref()
            .map(|c| c.refresh_token_id.clone())
    }

    /// Claims of the access credential, or `None` when absent or undecodable.
    #[must_use]
    pub fn access_claims(&self) -> Option<Claims> {
        let token = self.read().credentials.as_ref()?.access_token.clone();
        decode_logged(token.expose_secret(), "access")
    }

    /// Claims of the refresh credential, or `None` when absent or undecodable.
    #[must_use]
    pub fn refresh_claims(&self) -> Option<Claims> {
        let token = self.read().credentials.as_ref()?.refresh_token.clone();
        decode_logged(token.expose_secret(), "refresh")
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionStore")
            .field("authenticated", &state.credentials.is_some())
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}

fn decode_logged(token: &str, kind: &'static str) -> Option<Claims> {
    match claims::decode(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(credential = kind, error = %e, "Could not decode credential claims");
            None
        }
    }
}
