//! Flat key-value blob storage (the worker's `localStorage`).
//!
//! Values are whole JSON documents stored under string keys. Writes replace
//! the previous value; there is no merge and no read-modify-write
//! protection. A file-backed store rewrites its file after every mutation.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::CacheError;

#[derive(Debug)]
pub struct LocalStore {
    entries: RwLock<HashMap<String, String>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Create a store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// Open a file-backed store, loading existing contents if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened local store");

        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    /// Read and decode a JSON value. A value that no longer decodes is
    /// treated as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable stored value");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(key).is_some();
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<(), CacheError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let contents = serde_json::to_vec_pretty(entries)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
