//! Memory text store for testing
//!
//! Shared map with per-operation call counters and fault injection.
//! Operations can be paused so a test can hold a write in flight.

use arealink_core::effects::storage::validate_key;
use arealink_core::{SecureTextStore, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// Store operation, for counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    /// `set`
    Set,
    /// `get`
    Get,
    /// `remove`
    Remove,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, String>,
    calls: HashMap<StorageOp, usize>,
    failures: HashMap<StorageOp, VecDeque<StorageError>>,
    forbid_overwrite: bool,
}

/// Memory storage handler for testing
#[derive(Debug, Clone)]
pub struct MemoryTextStore {
    state: Arc<Mutex<StoreState>>,
    gates: Arc<HashMap<StorageOp, watch::Sender<bool>>>,
}

impl Default for MemoryTextStore {
    fn default() -> Self {
        let gates = [StorageOp::Set, StorageOp::Get, StorageOp::Remove]
            .into_iter()
            .map(|op| (op, watch::channel(true).0))
            .collect();
        Self {
            state: Arc::default(),
            gates: Arc::new(gates),
        }
    }
}

impl MemoryTextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse `set` on existing keys with `DuplicateEntry`
    pub fn forbidding_overwrite(self) -> Self {
        self.state.lock().forbid_overwrite = true;
        self
    }

    /// Seed an entry without counting a call
    pub fn insert_raw(&self, key: &str, value: impl Into<String>) {
        self.state
            .lock()
            .entries
            .insert(key.to_string(), value.into());
    }

    /// Read an entry without counting a call
    pub fn peek(&self, key: &str) -> Option<String> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Whether `key` holds an entry
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls made for `op` so far, counted on arrival
    pub fn calls(&self, op: StorageOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: StorageOp, error: StorageError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Hold calls of `op` until [`resume`](Self::resume)
    pub fn pause(&self, op: StorageOp) {
        if let Some(gate) = self.gates.get(&op) {
            gate.send_replace(false);
        }
    }

    /// Release held calls of `op`
    pub fn resume(&self, op: StorageOp) {
        if let Some(gate) = self.gates.get(&op) {
            gate.send_replace(true);
        }
    }

    /// Yield until `op` has been called `count` times
    pub async fn wait_for_calls(&self, op: StorageOp, count: usize) {
        while self.calls(op) < count {
            tokio::task::yield_now().await;
        }
    }

    async fn begin(
        &self,
        op: StorageOp,
        key: &str,
    ) -> Result<parking_lot::MutexGuard<'_, StoreState>, StorageError> {
        validate_key(key)?;
        *self.state.lock().calls.entry(op).or_insert(0) += 1;
        trace!(?op, key, "Memory store call");
        self.pass_gate(op).await;

        let mut state = self.state.lock();
        if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            trace!(?op, key, error = %error, "Injected store failure");
            return Err(error);
        }
        Ok(state)
    }

    async fn pass_gate(&self, op: StorageOp) {
        let Some(gate) = self.gates.get(&op) else {
            return;
        };
        let mut open = gate.subscribe();
        while !*open.borrow_and_update() {
            if open.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl SecureTextStore for MemoryTextStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.begin(StorageOp::Set, key).await?;
        if state.forbid_overwrite && state.entries.contains_key(key) {
            return Err(StorageError::DuplicateEntry {
                key: key.to_string(),
            });
        }
        state.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, StorageError> {
        let state = self.begin(StorageOp::Get, key).await?;
        state
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::MissingEntry {
                key: key.to_string(),
            })
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut state = self.begin(StorageOp::Remove, key).await?;
        Ok(state.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_calls_and_injects_failures() {
        let store = MemoryTextStore::new();
        store.set("k", "v").await.unwrap();
        store.fail_next(StorageOp::Get, StorageError::backing("keychain locked"));
        assert!(store.get("k").await.is_err());
        assert_eq!(store.get("k").await.unwrap(), "v");
        assert_eq!(store.calls(StorageOp::Get), 2);
        assert_eq!(store.calls(StorageOp::Set), 1);
    }

    #[tokio::test]
    async fn overwrite_can_be_forbidden() {
        let store = MemoryTextStore::new().forbidding_overwrite();
        store.set("k", "v").await.unwrap();
        assert_eq!(
            store.set("k", "w").await,
            Err(StorageError::DuplicateEntry { key: "k".into() })
        );
        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
    }

    #[tokio::test]
    async fn paused_set_lands_on_resume() {
        let store = MemoryTextStore::new();
        store.pause(StorageOp::Set);

        let held = {
            let store = store.clone();
            tokio::spawn(async move { store.set("k", "v").await })
        };
        store.wait_for_calls(StorageOp::Set, 1).await;
        assert!(!store.contains("k"));

        store.resume(StorageOp::Set);
        held.await.unwrap().unwrap();
        assert_eq!(store.peek("k").as_deref(), Some("v"));
    }
}
