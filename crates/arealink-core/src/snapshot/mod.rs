//! Snapshot records
//!
//! A snapshot is a versioned, timestamped, taggable capture of part of a
//! service's state. Every record carries a [`SnapshotHeader`] and the owning
//! service's fields. Service fields are optional at the type level so that a
//! stored record with a hole still decodes, and the owner can say exactly
//! which fields are missing instead of failing on the first one.
//!
//! One record is stored per snapshot kind, under the key in [`keys`].

pub mod codec;

use crate::identity::{AccessToken, Credentials, RefreshToken, Role, SessionIdentity, Specialty};
use crate::time::PhysicalTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub use codec::CodecError;

/// Snapshot format version written into every header
pub const SNAPSHOT_FORMAT_VERSION: &str = "1";

/// Storage keys, one per snapshot kind
pub mod keys {
    /// Session identity record
    pub const IDENTITY: &str = "arealink.identity";
    /// Pending entry application record
    pub const ONBOARDING: &str = "arealink.onboarding";
    /// Paired Area record
    pub const BOOTSTRAP: &str = "arealink.bootstrap";
}

/// Snapshot capture and restore errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// In-memory state is not ready to be captured
    #[error("Nothing loaded to capture for {kind}")]
    UnloadedEntry {
        /// Snapshot kind that was requested
        kind: &'static str,
    },

    /// A stored record lacks required fields
    #[error("Snapshot is missing required fields: {}", missing.join(", "))]
    IncompleteSnapshot {
        /// Names of the absent fields
        missing: Vec<&'static str>,
    },

    /// The record cannot be applied to this target
    #[error("Snapshot does not fit the target: {reason}")]
    TypeMismatch {
        /// Why the record was refused
        reason: String,
    },
}

/// Header shared by every snapshot kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Snapshot identifier
    pub id: Uuid,
    /// Free-form label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// When the snapshot was captured
    pub taken_on: PhysicalTime,
    /// Format version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SnapshotHeader {
    /// Header for a snapshot of `kind` captured at `taken_on`.
    ///
    /// The id is derived from kind and capture time, so two captures of the
    /// same state at the same instant encode identically.
    pub fn stamped(kind: &str, taken_on: PhysicalTime) -> Self {
        let name = format!("{kind}@{}", taken_on.ts_ms);
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            tag: None,
            taken_on,
            version: Some(SNAPSHOT_FORMAT_VERSION.to_string()),
        }
    }

    /// Attach a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// A storable snapshot record
pub trait Snapshot: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Discriminator written into the encoded record
    const KIND: &'static str;

    /// The record header
    fn header(&self) -> &SnapshotHeader;
}

/// Something that can capture its state as a snapshot and restore from one
pub trait Snapshotable: Send + Sync {
    /// Record type produced and consumed
    type Snapshot: Snapshot;

    /// Capture current state under `header`; `UnloadedEntry` when not ready
    fn capture_snapshot(&self, header: SnapshotHeader) -> Result<Self::Snapshot, SnapshotError>;

    /// Replace current state with the snapshot's
    fn restore_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), SnapshotError>;
}

/// Collects the names of absent required fields
struct Missing(Vec<&'static str>);

impl Missing {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn check<T>(&mut self, name: &'static str, value: &Option<T>) {
        if value.is_none() {
            self.0.push(name);
        }
    }

    fn into_result(self) -> Result<(), SnapshotError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(SnapshotError::IncompleteSnapshot { missing: self.0 })
        }
    }
}

/// Persisted session identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    #[serde(flatten)]
    pub header: SnapshotHeader,
    /// Application that was granted entry
    pub application_id: Option<String>,
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<RefreshToken>,
    /// Access token expiry
    pub expires_at: Option<PhysicalTime>,
    pub role: Option<Role>,
    /// Capability names granted with the role
    pub capabilities: Option<BTreeSet<String>>,
    /// Specialties assigned at entry; may be empty but not absent
    pub specialties: Option<Vec<Specialty>>,
}

impl IdentitySnapshot {
    /// Names of required fields that are absent
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut missing = Missing::new();
        missing.check("application_id", &self.application_id);
        missing.check("access_token", &self.access_token);
        missing.check("refresh_token", &self.refresh_token);
        missing.check("expires_at", &self.expires_at);
        missing.check("role", &self.role);
        missing.check("capabilities", &self.capabilities);
        missing.check("specialties", &self.specialties);
        missing.into_result()
    }

    /// Rebuild the identity; fails closed on any missing field
    pub fn into_identity(self) -> Result<SessionIdentity, SnapshotError> {
        self.validate()?;
        match self {
            IdentitySnapshot {
                application_id: Some(application_id),
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                expires_at: Some(expires_at),
                role: Some(role),
                capabilities: Some(capabilities),
                specialties: Some(specialties),
                ..
            } => Ok(SessionIdentity::new(
                application_id,
                role,
                capabilities,
                specialties,
                Credentials {
                    access_token,
                    refresh_token,
                    expires_at,
                },
            )),
            _ => Err(SnapshotError::TypeMismatch {
                reason: "identity snapshot changed during validation".to_string(),
            }),
        }
    }
}

impl Snapshot for IdentitySnapshot {
    const KIND: &'static str = "identity";

    fn header(&self) -> &SnapshotHeader {
        &self.header
    }
}

/// Persisted pending entry application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingSnapshot {
    #[serde(flatten)]
    pub header: SnapshotHeader,
    /// Area the application was sent to
    pub area_name: Option<String>,
    /// Identifier returned when the entry form was submitted
    pub application_id: Option<String>,
    /// After this the pending application is discarded
    pub application_expires_at: Option<PhysicalTime>,
}

impl OnboardingSnapshot {
    /// Fail closed on any missing field
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut missing = Missing::new();
        missing.check("area_name", &self.area_name);
        missing.check("application_id", &self.application_id);
        missing.check("application_expires_at", &self.application_expires_at);
        missing.into_result()
    }
}

impl Snapshot for OnboardingSnapshot {
    const KIND: &'static str = "onboarding";

    fn header(&self) -> &SnapshotHeader {
        &self.header
    }
}

/// Persisted binding to the paired Area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSnapshot {
    #[serde(flatten)]
    pub header: SnapshotHeader,
    pub area_name: Option<String>,
    /// Base URL of the paired Area's API
    pub endpoint: Option<String>,
}

impl BootstrapSnapshot {
    /// Fail closed on any missing field
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut missing = Missing::new();
        missing.check("area_name", &self.area_name);
        missing.check("endpoint", &self.endpoint);
        missing.into_result()
    }
}

impl Snapshot for BootstrapSnapshot {
    const KIND: &'static str = "bootstrap";

    fn header(&self) -> &SnapshotHeader {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn header() -> SnapshotHeader {
        SnapshotHeader::stamped(IdentitySnapshot::KIND, PhysicalTime::from_secs(5))
    }

    #[test]
    fn stamped_ids_are_stable_per_kind_and_instant() {
        let t = PhysicalTime::from_secs(5);
        assert_eq!(
            SnapshotHeader::stamped("identity", t),
            SnapshotHeader::stamped("identity", t)
        );
        assert_ne!(
            SnapshotHeader::stamped("identity", t).id,
            SnapshotHeader::stamped("bootstrap", t).id
        );
    }

    #[test]
    fn incomplete_identity_lists_every_missing_field() {
        let snapshot = IdentitySnapshot {
            header: header(),
            application_id: Some("app".into()),
            access_token: None,
            refresh_token: Some(RefreshToken::new("r")),
            expires_at: None,
            role: Some(Role::Member),
            capabilities: Some(BTreeSet::new()),
            specialties: None,
        };
        assert_matches!(
            snapshot.into_identity(),
            Err(SnapshotError::IncompleteSnapshot { missing })
                if missing == vec!["access_token", "expires_at", "specialties"]
        );
    }

    #[test]
    fn bootstrap_requires_endpoint() {
        let snapshot = BootstrapSnapshot {
            header: SnapshotHeader::stamped(BootstrapSnapshot::KIND, PhysicalTime::from_secs(1)),
            area_name: Some("North Field".into()),
            endpoint: None,
        };
        assert_matches!(
            snapshot.validate(),
            Err(SnapshotError::IncompleteSnapshot { missing }) if missing == vec!["endpoint"]
        );
    }
}
