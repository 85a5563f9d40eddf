//! Where the client keeps its session between runs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::api::ClientError;
use crate::auth::PublicUser;

/// What survives a restart: the flag, the access token, the cached user and
/// the API cookies. The refresh token rides in `cookies`, so a restarted
/// client can still rotate an expired access token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuth {
    pub is_authenticated: bool,
    pub access_token: Option<String>,
    pub user: Option<PublicUser>,
    /// `Cookie` header value exported from the client's jar.
    #[serde(default)]
    pub cookies: Option<String>,
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedAuth>, ClientError>;
    fn save(&self, auth: &PersistedAuth) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

/// JSON file, by default `<config dir>/voiceauth/session.json`.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|d| Self::new(d.join("voiceauth").join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedAuth>, ClientError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&raw) {
            Ok(auth) => Ok(Some(auth)),
            Err(e) => {
                // A corrupt file is treated as no session at all.
                warn!(path = %self.path.display(), error = %e, "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, auth: &PersistedAuth) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(auth)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<PersistedAuth>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(auth: PersistedAuth) -> Self {
        Self {
            inner: Mutex::new(Some(auth)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PersistedAuth>> {
        // A poisoned slot still holds plain data.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedAuth>, ClientError> {
        Ok(self.slot().clone())
    }

    fn save(&self, auth: &PersistedAuth) -> Result<(), ClientError> {
        *self.slot() = Some(auth.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.slot() = None;
        Ok(())
    }
}
