//! Session-layer error types
//!
//! Each component has its own enum; [`AreaError`] aggregates them for callers
//! that only need to log or classify a failure.

use arealink_core::{
    CodecError, ConfigError, DomainError, LateError, NetworkError, SnapshotError, StorageError,
    TimeError,
};
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, AreaError>;

/// Memento agent failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MementoError {
    /// The store refused or could not serve the request
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The stored text could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The target could not capture or restore
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The capture timestamp could not be read
    #[error(transparent)]
    Time(#[from] TimeError),
}

impl MementoError {
    /// Whether the failure is an absent storage entry
    pub fn is_missing_entry(&self) -> bool {
        matches!(self, MementoError::Storage(err) if err.is_missing_entry())
    }
}

/// Credential renewal failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// There is no active session to renew
    #[error("No active session to renew")]
    NotBooted,

    /// The Area refused the refresh token; the session has been logged out
    #[error("Refresh rejected by the Area: {0}")]
    Rejected(NetworkError),

    /// Transient failures outlasted the retry policy; onboarding is required
    #[error("Renewal gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: NetworkError,
    },

    /// The clock could not be read
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Failures restoring a session at process start
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootError {
    /// Nothing is stored under the identity key
    #[error("No stored session identity")]
    MissingEntry,

    /// The stored identity could not be decoded
    #[error("Stored session identity is unreadable: {0}")]
    Codec(CodecError),

    /// The stored identity lacks required fields
    #[error("Stored session identity is incomplete: missing {}", missing.join(", "))]
    IncompleteSnapshot {
        /// Names of the absent fields
        missing: Vec<&'static str>,
    },

    /// The store failed for another reason
    #[error("Storage failure during boot: {0}")]
    Storage(StorageError),

    /// The clock could not be read
    #[error(transparent)]
    Time(#[from] TimeError),
}

impl From<SnapshotError> for BootError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::IncompleteSnapshot { missing } => BootError::IncompleteSnapshot { missing },
            SnapshotError::TypeMismatch { reason } => BootError::Codec(CodecError::TypeMismatch {
                expected: "identity",
                reason,
            }),
            SnapshotError::UnloadedEntry { kind } => BootError::IncompleteSnapshot {
                missing: vec![kind],
            },
        }
    }
}

impl From<MementoError> for BootError {
    fn from(err: MementoError) -> Self {
        match err {
            MementoError::Storage(err) if err.is_missing_entry() => BootError::MissingEntry,
            MementoError::Storage(err) => BootError::Storage(err),
            MementoError::Codec(err) => BootError::Codec(err),
            MementoError::Snapshot(err) => err.into(),
            MementoError::Time(err) => BootError::Time(err),
        }
    }
}

/// Onboarding handshake failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OnboardingError {
    /// Transport or protocol failure talking to the Area
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The Area answered with a domain outcome that ends this step
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Required answers are missing
    #[error("Missing answers for required fields: {}", missing.join(", "))]
    InvalidAnswers {
        /// Keys of the unanswered required fields
        missing: Vec<String>,
    },

    /// The user cancelled before the result arrived; the result was discarded
    #[error("Pairing cancelled")]
    Cancelled,

    /// No pending application is stored
    #[error("No pending entry application")]
    NoPendingApplication,

    /// The pending application could not be persisted or read back
    #[error(transparent)]
    Memento(#[from] MementoError),

    /// The clock could not be read
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Aggregate of every session-layer failure
#[derive(Debug, Error)]
pub enum AreaError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session boot failed
    #[error("Boot failed: {0}")]
    Boot(#[from] BootError),

    /// Credential renewal failed
    #[error("Renewal failed: {0}")]
    Renewal(#[from] RenewalError),

    /// Onboarding failed
    #[error("Onboarding failed: {0}")]
    Onboarding(#[from] OnboardingError),

    /// Snapshot persistence failed
    #[error("Persistence failed: {0}")]
    Memento(#[from] MementoError),

    /// Network call failed
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// A late-bound handle was used out of order
    #[error("Handle error: {0}")]
    Late(#[from] LateError),

    /// Operation requires an established session
    #[error("No active session")]
    NotAuthorized,
}

impl AreaError {
    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AreaError::Network(err) => err.is_transient(),
            AreaError::Onboarding(OnboardingError::Network(err)) => err.is_transient(),
            AreaError::Onboarding(OnboardingError::Domain(DomainError::UndecidedApplication {
                ..
            })) => true,
            AreaError::Renewal(RenewalError::Exhausted { .. }) => true,
            AreaError::Boot(BootError::Storage(StorageError::BackingFailure { .. }))
            | AreaError::Memento(MementoError::Storage(StorageError::BackingFailure { .. })) => {
                true
            }
            AreaError::Boot(BootError::Time(_))
            | AreaError::Renewal(RenewalError::Time(_))
            | AreaError::Onboarding(OnboardingError::Time(_))
            | AreaError::Memento(MementoError::Time(_)) => true,
            _ => false,
        }
    }
}
