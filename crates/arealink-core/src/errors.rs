//! Domain and wiring errors
//!
//! Errors tied to an effect interface live beside that interface
//! (`StorageError`, `NetworkError`, `TimeError`) and snapshot errors live in
//! `snapshot`. This module holds the rest.

use serde::{Deserialize, Serialize};

/// Outcomes of the onboarding handshake that the Area decides, not the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DomainError {
    /// The Area is not accepting entry applications
    #[error("Area is closed to new entries")]
    AreaClosed,

    /// The entry application was refused, or lapsed before a verdict
    #[error("Entry application {application_id} was rejected")]
    RejectedApplication {
        /// Identifier of the rejected application
        application_id: String,
    },

    /// No verdict has been reached yet
    #[error("Entry application {application_id} is still undecided")]
    UndecidedApplication {
        /// Identifier of the pending application
        application_id: String,
    },
}

/// Errors from `Late` back-reference cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LateError {
    /// `back` was called on a cell that already holds a value
    #[error("Late cell is already backed")]
    AlreadyBacked,

    /// The cell has not been backed yet
    #[error("Late cell has not been backed")]
    Unbacked,

    /// The owning cell has been dropped
    #[error("Late cell has been released by its owner")]
    Released,
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {reason}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying I/O failure
        reason: String,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {reason}")]
    Parse {
        /// Path that was parsed
        path: String,
        /// Parser message
        reason: String,
    },

    /// A value is out of its allowed range
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted field name
        field: &'static str,
        /// Why the value was refused
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
