//! Durable backends for the favorites blob.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("favorites storage I/O failed for {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("favorites storage unavailable: {0}")]
    Unavailable(String),
}

/// A single named slot holding the serialized favorites.
#[async_trait]
pub trait FavoritesStorage: Send + Sync {
    /// The stored blob, or `None` if nothing was ever written.
    async fn read(&self) -> Result<Option<String>, StorageError>;

    /// Replace the stored blob.
    async fn write(&self, blob: &str) -> Result<(), StorageError>;
}

/// Stores the blob in a JSON file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl FavoritesStorage for JsonFileStorage {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn write(&self, blob: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(blob.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        trace!(path = %self.path.display(), bytes = blob.len(), "favorites written");
        Ok(())
    }
}

/// Keeps the blob in memory. Used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `blob` already stored.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    pub async fn blob(&self) -> Option<String> {
        self.blob.lock().await.clone()
    }
}

#[async_trait]
impl FavoritesStorage for MemoryStorage {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.blob.lock().await.clone())
    }

    async fn write(&self, blob: &str) -> Result<(), StorageError> {
        *self.blob.lock().await = Some(blob.to_string());
        Ok(())
    }
}
