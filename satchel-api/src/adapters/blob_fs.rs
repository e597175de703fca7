//! Filesystem blob storage
//!
//! Blobs live under `<root>/blobs/<relative path>`. Writes go to a temp file
//! first and are renamed into place so a reader never sees a partial blob.

use async_trait::async_trait;
use satchel_common::ports::BlobStorage;
use satchel_common::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Blob storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsBlobStorage {
    base: PathBuf,
}

impl FsBlobStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Map a relative blob path onto the base directory
    ///
    /// Absolute paths and parent components are rejected.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(Error::Storage(format!("Invalid blob path: {}", path)));
        }
        Ok(self.base.join(relative))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn put(&self, path: &str, bytes: &[u8], mime_type: &str) -> Result<()> {
        let full_path = self.full_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "blob storage: create_dir_all failed");
                Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let temp_path = full_path.with_extension("tmp");
        fs::write(&temp_path, bytes).await.map_err(|e| {
            warn!(path = %temp_path.display(), error = %e, "blob storage: write failed");
            Error::Storage(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "blob storage: rename failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage(format!(
                "Failed to move blob into {}: {}",
                full_path.display(),
                e
            )));
        }

        debug!(path, mime_type, size = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        fs::read(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", full_path.display(), e)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to delete {}: {}",
                full_path.display(),
                e
            ))),
        }
    }
}
