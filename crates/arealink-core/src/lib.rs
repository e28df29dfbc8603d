//! arealink Core - identity, snapshot and effect interfaces
//!
//! This crate holds the pure types and effect interfaces shared by every other
//! arealink crate. It performs no I/O of its own: storage, clocks and the
//! Area service are reached only through the effect traits, whose production
//! handlers live in `arealink-effects` and whose test doubles live in
//! `arealink-testkit`.
//!
//! # Layout
//!
//! - `identity`: the paired device's credential set, its immutable profile and
//!   the derived `AuthorizationContext`
//! - `snapshot`: versioned snapshot records and the text codec that stores them
//! - `effects`: `SecureTextStore`, `PhysicalTimeEffects`, `AreaClient` and the
//!   retry policy used around them
//! - `late`: set-once back-reference cells for wiring before construction
//! - `config`: TOML configuration with validation

#![forbid(unsafe_code)]

/// Configuration loading and validation
pub mod config;

/// Effect interfaces (no implementations)
pub mod effects;

/// Domain and wiring errors
pub mod errors;

/// Session identity, profile and authorization context
pub mod identity;

/// Set-once back-reference cells
pub mod late;

/// Snapshot records and codec
pub mod snapshot;

/// Wall-clock time
pub mod time;

pub use config::{
    AreaLinkConfig, PairingSettings, RenewalSettings, RetrySettings, ServiceSettings,
    StorageSettings,
};
pub use effects::{
    AccessToken, ApiResponse, AreaClient, AreaCode, BackoffStrategy, CredentialGrant,
    EntryApplication, EntryField, EntryForm, EntryGrant, EntrySubmission, NetworkError,
    PhysicalTimeEffects, RefreshToken, RetryPolicy, SecureTextStore, StorageError, TimeError,
};
pub use errors::{ConfigError, DomainError, LateError};
pub use identity::{AuthorizationContext, Credentials, IdentityProfile, Role, SessionIdentity, Specialty};
pub use late::{Late, LateRef};
pub use snapshot::{
    codec, BootstrapSnapshot, CodecError, IdentitySnapshot, OnboardingSnapshot, Snapshot,
    SnapshotError, SnapshotHeader, Snapshotable,
};
pub use time::PhysicalTime;
