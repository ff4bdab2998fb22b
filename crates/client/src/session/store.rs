//! Durable credential storage.
//!
//! The session survives a restart by writing its three credential fields to
//! a [`CredentialStore`]. The refresh credential carries its own expiry: a
//! week when the user asked to be remembered, a day otherwise.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SessionError;

/// Refresh credential lifetime when "remember me" is checked.
pub const REMEMBERED_REFRESH_TTL: Duration = Duration::days(7);

/// Refresh credential lifetime for ordinary and federated logins.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::days(1);

/// The persisted form of a credential set.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_id: String,
    /// When the persisted refresh credential stops being worth restoring.
    pub refresh_expires_at: DateTime<Utc>,
}

impl StoredCredentials {
    /// Whether the record is past its persistence lifetime.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_token_id", &self.refresh_token_id)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Origin-scoped durable storage for the session credentials.
pub trait CredentialStore: Send + Sync {
    /// Read the persisted record, if any.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` if the backing store cannot be read.
    fn load(&self) -> Result<Option<StoredCredentials>, SessionError>;

    /// Replace the persisted record.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` if the backing store cannot be written.
    fn save(&self, credentials: &StoredCredentials) -> Result<(), SessionError>;

    /// Remove the persisted record. Removing an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` if the backing store cannot be written.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Keeps credentials in process memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StoredCredentials>> {
        self.record
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, SessionError> {
        Ok(self.slot().clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), SessionError> {
        *self.slot() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.slot() = None;
        Ok(())
    }
}

/// Persists credentials as a JSON file readable only by the current user.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, SessionError> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Persistence(e.to_string())),
        };

        match serde_json::from_slice(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // A corrupt file means there is nothing worth restoring.
                debug!(path = %self.path.display(), error = %e, "Ignoring unreadable credential file");
                Ok(None)
            }
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| SessionError::Persistence(e.to_string()))?;
        }

        let contents = serde_json::to_vec_pretty(credentials)
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        write_private(&self.path, &contents)
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Persistence(e.to_string())),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<(), SessionError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| SessionError::Persistence(e.to_string()))?;
    file.write_all(contents)
        .map_err(|e| SessionError::Persistence(e.to_string()))
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<(), SessionError> {
    std::fs::write(path, contents).map_err(|e| SessionError::Persistence(e.to_string()))
}
