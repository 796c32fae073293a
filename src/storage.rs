//! Key-value persistence.
//!
//! The engine persists a handful of small JSON documents (the current
//! license key, the demo countdown, the license configuration, the
//! licensed-user registry).  [`KeyValueStore`] is the seam: values are
//! JSON text addressed by a string key.  [`MemoryStore`] backs tests and
//! [`FileStore`] keeps one `<key>.json` file per key in a directory.
//!
//! Reads through [`read_json`] never fail: a missing key, an unreadable
//! file or corrupt JSON all come back as `None`, with a warning logged
//! for the last two.  Writes through [`write_json`] and [`remove_key`]
//! are fire-and-forget in the same way.  There is no protection against
//! two processes writing the same key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

pub const LICENSE_KEY_SLOT: &str = "app_license_key";
pub const DEMO_COUNTDOWN_SLOT: &str = "demo_countdown";
pub const LICENSE_CONFIG_SLOT: &str = "license_config";
pub const LICENSED_USERS_SLOT: &str = "licensed_users";
pub const USER_ROLES_SLOT: &str = "user_roles";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o error for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("failed to serialise `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A string-keyed store of JSON text.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Volatile in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Directory-backed store: key `k` lives in `<dir>/k.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !ok {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // Write-then-rename so a crash never leaves half a document behind.
        let tmp = path.with_extension("json.tmp");
        let io = |source: std::io::Error| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::write(&tmp, value).map_err(io)?;
        std::fs::rename(&tmp, &path).map_err(io)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Reads and parses a JSON value, treating every failure as "absent".
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read stored value, using defaults");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "stored value is not valid JSON, ignoring it");
            None
        }
    }
}

/// Serialises and stores a value.  Failures are logged, not returned.
pub fn write_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(|source| StorageError::Serialize {
            key: key.to_string(),
            source,
        })
        .and_then(|json| store.set(key, &json));
    if let Err(err) = result {
        tracing::warn!(key, error = %err, "failed to persist value");
    }
}

/// Removes a key.  Failures are logged, not returned.
pub fn remove_key(store: &dyn KeyValueStore, key: &str) {
    if let Err(err) = store.remove(key) {
        tracing::warn!(key, error = %err, "failed to remove stored value");
    }
}
