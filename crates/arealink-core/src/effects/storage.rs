//! Secure text store effect
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `arealink-effects` (filesystem), `arealink-testkit` (memory)
//! - **Usage**: the memento agent, which is the only writer of each key
//!
//! A capability-scoped key/value store for small text records. The concrete
//! backing is a platform keychain equivalent; only get/set/remove by key
//! matter. Handlers keep no cache: every call reaches the backing store.

use async_trait::async_trait;
use std::sync::Arc;

/// Storage operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// `get` on a key with no entry
    #[error("No entry stored under {key}")]
    MissingEntry {
        /// Key that was read
        key: String,
    },

    /// `set` on an existing key in a store that forbids overwrite
    #[error("Entry already stored under {key}")]
    DuplicateEntry {
        /// Key that was written
        key: String,
    },

    /// The key is not usable by this store
    #[error("Invalid storage key: {reason}")]
    InvalidKey {
        /// Why the key was refused
        reason: String,
    },

    /// The platform backing failed
    #[error("Storage backing failed: {reason}")]
    BackingFailure {
        /// Backing failure message
        reason: String,
    },
}

impl StorageError {
    /// Create a backing failure error
    pub fn backing(reason: impl Into<String>) -> Self {
        Self::BackingFailure {
            reason: reason.into(),
        }
    }

    /// Whether this is a read of an absent key
    pub fn is_missing_entry(&self) -> bool {
        matches!(self, StorageError::MissingEntry { .. })
    }
}

/// Durable text storage keyed by string
#[async_trait]
pub trait SecureTextStore: Send + Sync {
    /// Store `value` under `key`
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Read the value under `key`; `MissingEntry` when absent
    async fn get(&self, key: &str) -> Result<String, StorageError>;

    /// Delete the value under `key`, returning whether one existed
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;
}

/// Blanket implementation for Arc<T> where T: SecureTextStore
#[async_trait]
impl<T: SecureTextStore + ?Sized> SecureTextStore for Arc<T> {
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<String, StorageError> {
        (**self).get(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key).await
    }
}

/// Reject keys no backend can hold
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            reason: "Key cannot be empty".to_string(),
        });
    }
    if key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(StorageError::InvalidKey {
            reason: format!("Key {key} must be a single path-free name"),
        });
    }
    Ok(())
}
