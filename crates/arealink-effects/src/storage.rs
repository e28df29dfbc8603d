//! Filesystem-backed secure text store
//!
//! Stands in for the platform keychain on hosts without one. Each key is a
//! file under the base directory; writes land in a temporary sibling that is
//! renamed over the target, so a reader sees either the previous record or
//! the complete new one.

use arealink_core::effects::storage::validate_key;
use arealink_core::{SecureTextStore, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const ENTRY_EXTENSION: &str = "entry";

/// Filesystem text store for production use
#[derive(Debug, Clone)]
pub struct FilesystemTextStore {
    /// Base directory for entry files
    base_path: PathBuf,
}

impl FilesystemTextStore {
    /// Create a store rooted at `base_path`; the directory is created lazily
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory holding the entries
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    async fn ensure_base_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            StorageError::backing(format!(
                "Failed to create directory {}: {e}",
                self.base_path.display()
            ))
        })?;
        restrict_permissions(&self.base_path, 0o700).await
    }
}

#[async_trait]
impl SecureTextStore for FilesystemTextStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key)?;
        self.ensure_base_dir().await?;

        let staging = self
            .base_path
            .join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&staging, value).await {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::backing(format!(
                "Failed to write entry {key}: {e}"
            )));
        }
        restrict_permissions(&staging, 0o600).await?;

        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::backing(format!(
                "Failed to commit entry {key}: {e}"
            )));
        }

        tracing::debug!(key, bytes = value.len(), "Stored entry");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, StorageError> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => {
                tracing::debug!(key, bytes = value.len(), "Loaded entry");
                Ok(value)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::MissingEntry {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::backing(format!(
                "Failed to read entry {key}: {e}"
            ))),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "Removed entry");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::backing(format!(
                "Failed to remove entry {key}: {e}"
            ))),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| {
            StorageError::backing(format!(
                "Failed to restrict permissions on {}: {e}",
                path.display()
            ))
        })
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn get_on_absent_key_is_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemTextStore::new(dir.path());
        assert_matches!(
            store.get("arealink.identity").await,
            Err(StorageError::MissingEntry { key }) if key == "arealink.identity"
        );
        assert!(!store.remove("arealink.identity").await.unwrap());
    }

    #[tokio::test]
    async fn set_overwrites_and_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemTextStore::new(dir.path().join("nested"));
        store.set("k", "first").await.unwrap();
        store.set("k", "second").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), "second");

        let names: Vec<_> = std::fs::read_dir(store.base_path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.entry".to_string()]);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemTextStore::new(dir.path());
        assert_matches!(
            store.set("../outside", "x").await,
            Err(StorageError::InvalidKey { .. })
        );
    }
}
