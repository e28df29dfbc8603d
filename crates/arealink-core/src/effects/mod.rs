//! Effect interfaces
//!
//! Pure trait definitions for everything that touches the outside world.
//! Production handlers are provided by `arealink-effects`; deterministic
//! doubles by `arealink-testkit`. Domain code takes these as
//! `Arc<dyn Trait>` and never reaches for a concrete backend.

pub mod network;
pub mod reliability;
pub mod storage;
pub mod time;

pub use crate::identity::{AccessToken, RefreshToken};
pub use network::{
    ApiResponse, AreaClient, AreaCode, CredentialGrant, EntryApplication, EntryField, EntryForm,
    EntryGrant, EntrySubmission, NetworkError,
};
pub use reliability::{BackoffStrategy, RetryPolicy};
pub use storage::{SecureTextStore, StorageError};
pub use time::{PhysicalTimeEffects, TimeError};
