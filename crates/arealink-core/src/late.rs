//! Set-once back-reference cells
//!
//! A `Late<T>` lets a dependency graph be wired before the value it points at
//! exists. Whoever calls [`Late::back`] first supplies the value; everyone
//! else reads it through the cell, or through a non-owning [`LateRef`] that
//! stops resolving once the owning cell is dropped.

use crate::errors::LateError;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};

/// Owning set-once cell
pub struct Late<T> {
    slot: Arc<OnceCell<Arc<T>>>,
}

impl<T> Late<T> {
    /// Create an unbacked cell
    pub fn new() -> Self {
        Self {
            slot: Arc::new(OnceCell::new()),
        }
    }

    /// Supply the value. Fails if the cell was already backed.
    pub fn back(&self, value: T) -> Result<Arc<T>, LateError> {
        self.back_shared(Arc::new(value))
    }

    /// Supply an already shared value. Fails if the cell was already backed.
    pub fn back_shared(&self, value: Arc<T>) -> Result<Arc<T>, LateError> {
        self.slot
            .set(Arc::clone(&value))
            .map_err(|_| LateError::AlreadyBacked)?;
        Ok(value)
    }

    /// The value, if backed
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.get().cloned()
    }

    /// Whether `back` has succeeded
    pub fn is_backed(&self) -> bool {
        self.slot.get().is_some()
    }

    /// A non-owning handle for later lookup
    pub fn reference(&self) -> LateRef<T> {
        LateRef {
            slot: Arc::downgrade(&self.slot),
        }
    }
}

impl<T> Default for Late<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Late<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Late")
            .field("backed", &self.is_backed())
            .finish()
    }
}

/// Non-owning handle to a `Late<T>`
pub struct LateRef<T> {
    slot: Weak<OnceCell<Arc<T>>>,
}

impl<T> LateRef<T> {
    /// Resolve the value.
    ///
    /// Fails with `Released` once the owning `Late` is gone and with
    /// `Unbacked` while it has not been backed.
    pub fn get(&self) -> Result<Arc<T>, LateError> {
        let slot = self.slot.upgrade().ok_or(LateError::Released)?;
        slot.get().cloned().ok_or(LateError::Unbacked)
    }

    /// Whether the owning cell still exists
    pub fn is_live(&self) -> bool {
        self.slot.strong_count() > 0
    }
}

impl<T> Clone for LateRef<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Weak::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for LateRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LateRef")
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_exactly_once() {
        let late = Late::new();
        assert!(late.get().is_none());
        assert_eq!(*late.back(7_u32).unwrap(), 7);
        assert_eq!(late.back(8), Err(LateError::AlreadyBacked));
        assert_eq!(late.get().map(|v| *v), Some(7));
    }

    #[test]
    fn reference_tracks_owner_lifecycle() {
        let late: Late<String> = Late::new();
        let handle = late.reference();
        assert_eq!(handle.get(), Err(LateError::Unbacked));

        late.back("ready".to_string()).unwrap();
        assert_eq!(handle.get().unwrap().as_str(), "ready");

        drop(late);
        assert!(!handle.is_live());
        assert_eq!(handle.get(), Err(LateError::Released));
    }
}
