//! Memento agent
//!
//! Glue between one snapshotable target and one storage key. The agent is the
//! only writer of its key: captures encode the whole record before touching
//! the store, so a failed capture leaves the previous record in place.

use crate::errors::MementoError;
use arealink_core::snapshot::codec;
use arealink_core::{PhysicalTimeEffects, SecureTextStore, Snapshot, SnapshotHeader, Snapshotable};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Captures a target into the store and restores it back
pub struct MementoAgent<T: Snapshotable> {
    target: Arc<T>,
    key: &'static str,
    tag: Option<String>,
    store: Arc<dyn SecureTextStore>,
    time: Arc<dyn PhysicalTimeEffects>,
}

impl<T: Snapshotable> MementoAgent<T> {
    /// Agent persisting `target` under `key`
    pub fn new(
        target: Arc<T>,
        key: &'static str,
        store: Arc<dyn SecureTextStore>,
        time: Arc<dyn PhysicalTimeEffects>,
    ) -> Self {
        Self {
            target,
            key,
            tag: None,
            store,
            time,
        }
    }

    /// Tag every captured snapshot with `tag`
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Storage key this agent owns
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The snapshotable target
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Capture the target and store it.
    ///
    /// A target that is not ready fails with `UnloadedEntry` and the store is
    /// not called.
    pub async fn capture(&self) -> Result<(), MementoError> {
        let taken_on = self.time.physical_time().await?;
        let mut header = SnapshotHeader::stamped(T::Snapshot::KIND, taken_on);
        if let Some(tag) = &self.tag {
            header = header.with_tag(tag.clone());
        }

        let snapshot = self.target.capture_snapshot(header)?;
        let encoded = codec::encode(&snapshot)?;
        self.store.set(self.key, &encoded).await?;

        debug!(key = self.key, kind = T::Snapshot::KIND, taken_on = %taken_on, "Snapshot captured");
        Ok(())
    }

    /// Read and decode the stored snapshot without applying it
    pub async fn load(&self) -> Result<T::Snapshot, MementoError> {
        let raw = self.store.get(self.key).await?;
        let snapshot = codec::decode::<T::Snapshot>(&raw)?;
        debug!(key = self.key, kind = T::Snapshot::KIND, "Snapshot loaded");
        Ok(snapshot)
    }

    /// Read the stored snapshot and apply it to the target
    pub async fn restore(&self) -> Result<(), MementoError> {
        let snapshot = self.load().await?;
        self.target.restore_snapshot(snapshot)?;
        Ok(())
    }

    /// Delete the stored snapshot; `false` when there was none
    pub async fn remove(&self) -> Result<bool, MementoError> {
        let removed = self.store.remove(self.key).await?;
        debug!(key = self.key, removed, "Snapshot removed");
        Ok(removed)
    }
}

impl<T: Snapshotable> Clone for MementoAgent<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            key: self.key,
            tag: self.tag.clone(),
            store: self.store.clone(),
            time: self.time.clone(),
        }
    }
}

impl<T: Snapshotable> fmt::Debug for MementoAgent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MementoAgent")
            .field("key", &self.key)
            .field("kind", &T::Snapshot::KIND)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionIdentityService;
    use arealink_core::snapshot::keys;
    use arealink_core::{CodecError, Role, SnapshotError, StorageError};
    use arealink_testkit::{fixtures, ControllableTime, MemoryTextStore, StorageOp};
    use assert_matches::assert_matches;

    fn agent(
        service: Arc<SessionIdentityService>,
        store: &MemoryTextStore,
        clock: &ControllableTime,
    ) -> MementoAgent<SessionIdentityService> {
        MementoAgent::new(
            service,
            keys::IDENTITY,
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn capture_of_unbooted_target_leaves_store_untouched() {
        let store = MemoryTextStore::new();
        let clock = ControllableTime::new(1_000);
        let memento = agent(Arc::new(SessionIdentityService::new()), &store, &clock);

        assert_matches!(
            memento.capture().await,
            Err(MementoError::Snapshot(SnapshotError::UnloadedEntry { kind: "identity" }))
        );
        assert_eq!(store.calls(StorageOp::Set), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn capture_then_restore_into_fresh_service() {
        let store = MemoryTextStore::new();
        let clock = ControllableTime::new(1_000);
        let identity = fixtures::identity(Role::Crew, 90_000);
        let source = Arc::new(SessionIdentityService::from_identity(identity.clone()));
        agent(source, &store, &clock).capture().await.unwrap();

        let restored = Arc::new(SessionIdentityService::new());
        agent(restored.clone(), &store, &clock)
            .restore()
            .await
            .unwrap();
        assert_eq!(restored.identity(), Some(identity));
    }

    #[tokio::test]
    async fn tagged_capture_carries_tag() {
        let store = MemoryTextStore::new();
        let clock = ControllableTime::new(1_000);
        let service = Arc::new(SessionIdentityService::from_identity(fixtures::identity(
            Role::Member,
            90_000,
        )));
        let memento = agent(service, &store, &clock).with_tag("paired");
        memento.capture().await.unwrap();
        assert_eq!(memento.load().await.unwrap().header.tag.as_deref(), Some("paired"));
    }

    #[tokio::test]
    async fn restore_propagates_missing_and_malformed() {
        let store = MemoryTextStore::new();
        let clock = ControllableTime::new(1_000);
        let memento = agent(Arc::new(SessionIdentityService::new()), &store, &clock);

        let err = memento.restore().await.unwrap_err();
        assert!(err.is_missing_entry());

        store.insert_raw(keys::IDENTITY, "{not json");
        assert_matches!(
            memento.restore().await,
            Err(MementoError::Codec(CodecError::Malformed { .. }))
        );
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_record() {
        let store = MemoryTextStore::new();
        let clock = ControllableTime::new(1_000);
        let service = Arc::new(SessionIdentityService::from_identity(fixtures::identity(
            Role::Member,
            90_000,
        )));
        let memento = agent(service, &store, &clock);
        memento.capture().await.unwrap();
        let before = store.peek(keys::IDENTITY);

        clock.advance(std::time::Duration::from_secs(1));
        store.fail_next(StorageOp::Set, StorageError::backing("keychain locked"));
        assert_matches!(memento.capture().await, Err(MementoError::Storage(_)));
        assert_eq!(store.peek(keys::IDENTITY), before);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = MemoryTextStore::new();
        let clock = ControllableTime::new(1_000);
        let service = Arc::new(SessionIdentityService::from_identity(fixtures::identity(
            Role::Member,
            90_000,
        )));
        let memento = agent(service, &store, &clock);
        memento.capture().await.unwrap();

        assert!(memento.remove().await.unwrap());
        assert!(!memento.remove().await.unwrap());
    }
}
