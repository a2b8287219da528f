//! Caller identity: where the principal comes from and where it is kept.
//!
//! The last known principal is the only durable state the client touches.
//! It is read once when the client is built and written on every
//! `set_principal`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;
use crate::sync::lock;

/// Persists the last known principal across restarts and reconnects.
pub trait IdentityStore: Send + Sync + fmt::Debug {
    /// Reads the stored principal, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Identity`] if the backing store is
    /// unreadable.
    fn load_principal(&self) -> Result<Option<String>, RealtimeError>;

    /// Replaces the stored principal.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Identity`] if the backing store cannot be
    /// written.
    fn store_principal(&self, principal: &str) -> Result<(), RealtimeError>;
}

/// Supplies the caller's current principal, e.g. from a signed-in session.
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Current principal, or `None` when nobody is signed in.
    fn principal(&self) -> Option<String>;
}

/// Process-local store; forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    principal: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `principal`.
    #[must_use]
    pub fn with_principal(principal: impl Into<String>) -> Self {
        Self {
            principal: Mutex::new(Some(principal.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load_principal(&self) -> Result<Option<String>, RealtimeError> {
        Ok(lock(&self.principal).clone())
    }

    fn store_principal(&self, principal: &str) -> Result<(), RealtimeError> {
        *lock(&self.principal) = Some(principal.to_string());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityDocument {
    principal: String,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// JSON file holding the last principal.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so a crash never leaves a half-written document.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Creates a store backed by `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load_principal(&self) -> Result<Option<String>, RealtimeError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RealtimeError::Identity(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };
        let document: IdentityDocument = serde_json::from_str(&raw).map_err(|e| {
            RealtimeError::Identity(format!("parsing {}: {e}", self.path.display()))
        })?;
        Ok(Some(document.principal))
    }

    fn store_principal(&self, principal: &str) -> Result<(), RealtimeError> {
        let document = IdentityDocument {
            principal: principal.to_string(),
            updated_at: chrono::Utc::now(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RealtimeError::Identity(format!("creating {}: {e}", parent.display()))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| RealtimeError::Identity(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            RealtimeError::Identity(format!("replacing {}: {e}", self.path.display()))
        })
    }
}

/// Provider returning a fixed principal.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    principal: String,
}

impl StaticIdentityProvider {
    /// Creates a provider that always reports `principal`.
    #[must_use]
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn principal(&self) -> Option<String> {
        Some(self.principal.clone())
    }
}
