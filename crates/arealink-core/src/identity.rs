//! Session identity of a paired device
//!
//! A `SessionIdentity` splits into two parts with different lifetimes:
//!
//! - the `IdentityProfile` (application id, role, capabilities, specialties),
//!   fixed for the whole session and shared behind an `Arc`;
//! - the `Credentials` triple (access token, refresh token, expiry), the only
//!   part that renewal replaces.
//!
//! The `AuthorizationContext` handed to role-scoped consumers is derived from
//! the profile and can only be obtained from one.

use crate::effects::network::CredentialGrant;
use crate::snapshot::{IdentitySnapshot, SnapshotHeader};
use crate::time::PhysicalTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

macro_rules! secret_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw token value
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw token value, for the wire only
            pub fn expose(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(<redacted {} bytes>)"), self.0.len())
            }
        }
    };
}

secret_token!(
    /// Short-lived bearer credential presented on every Area call
    AccessToken
);

secret_token!(
    /// Long-lived credential exchanged for a new access token
    RefreshToken
);

/// Role the Area assigned to this device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular member of the Area
    Member,
    /// Crew working the Area
    Crew,
    /// Area management
    Management,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Crew => write!(f, "crew"),
            Role::Management => write!(f, "management"),
        }
    }
}

/// A specialty a crew or management device is qualified for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specialty {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
}

impl Specialty {
    /// Create a specialty
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The renewable part of an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token for Area calls
    pub access_token: AccessToken,
    /// Token exchanged on renewal
    pub refresh_token: RefreshToken,
    /// When `access_token` stops being accepted
    pub expires_at: PhysicalTime,
}

impl Credentials {
    /// Credentials after applying a renewal grant.
    ///
    /// A grant without a refresh token keeps the current one.
    pub fn renewed(&self, grant: CredentialGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or_else(|| self.refresh_token.clone()),
            expires_at: grant.expires_at,
        }
    }

    /// Whether the access token has expired at `now`
    pub fn is_expired_at(&self, now: PhysicalTime) -> bool {
        now >= self.expires_at
    }
}

/// The fixed part of an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    application_id: String,
    role: Role,
    capabilities: BTreeSet<String>,
    specialties: Vec<Specialty>,
}

impl IdentityProfile {
    /// Entry application this identity was granted through
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Assigned role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Granted capabilities
    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Qualified specialties
    pub fn specialties(&self) -> &[Specialty] {
        &self.specialties
    }

    /// Role appropriation: copy role, capabilities and specialties into an
    /// immutable context.
    pub fn authorization_context(&self) -> AuthorizationContext {
        AuthorizationContext {
            role: self.role,
            capabilities: self.capabilities.clone(),
            specialties: self.specialties.clone(),
        }
    }
}

/// Full credential set of a paired device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    profile: Arc<IdentityProfile>,
    credentials: Credentials,
}

impl SessionIdentity {
    /// Assemble an identity from a granted pairing or a validated snapshot
    pub fn new(
        application_id: impl Into<String>,
        role: Role,
        capabilities: BTreeSet<String>,
        specialties: Vec<Specialty>,
        credentials: Credentials,
    ) -> Self {
        Self {
            profile: Arc::new(IdentityProfile {
                application_id: application_id.into(),
                role,
                capabilities,
                specialties,
            }),
            credentials,
        }
    }

    /// Shared fixed part
    pub fn profile(&self) -> &Arc<IdentityProfile> {
        &self.profile
    }

    /// Renewable part
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Split into the fixed and renewable parts
    pub fn into_parts(self) -> (Arc<IdentityProfile>, Credentials) {
        (self.profile, self.credentials)
    }

    /// Rejoin a profile with credentials
    pub fn from_parts(profile: Arc<IdentityProfile>, credentials: Credentials) -> Self {
        Self {
            profile,
            credentials,
        }
    }

    /// Assigned role
    pub fn role(&self) -> Role {
        self.profile.role
    }

    /// Role appropriation for this identity
    pub fn authorization_context(&self) -> AuthorizationContext {
        self.profile.authorization_context()
    }

    /// Capture this identity as a snapshot record
    pub fn to_snapshot(&self, header: SnapshotHeader) -> IdentitySnapshot {
        IdentitySnapshot {
            header,
            application_id: Some(self.profile.application_id.clone()),
            access_token: Some(self.credentials.access_token.clone()),
            refresh_token: Some(self.credentials.refresh_token.clone()),
            expires_at: Some(self.credentials.expires_at),
            role: Some(self.profile.role),
            capabilities: Some(self.profile.capabilities.clone()),
            specialties: Some(self.profile.specialties.clone()),
        }
    }
}

/// Read-only, role-scoped view handed to downstream consumers.
///
/// Only obtainable through role appropriation on an identity profile. A role
/// change needs a new session, never an update in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    role: Role,
    capabilities: BTreeSet<String>,
    specialties: Vec<Specialty>,
}

impl AuthorizationContext {
    /// Assigned role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Granted capabilities
    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Qualified specialties
    pub fn specialties(&self) -> &[Specialty] {
        &self.specialties
    }

    /// Whether `capability` was granted
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Whether the specialty with `id` was granted
    pub fn has_specialty(&self, id: &str) -> bool {
        self.specialties.iter().any(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity::new(
            "app-1",
            Role::Crew,
            ["tickets.scan".to_string()].into_iter().collect(),
            vec![Specialty::new("medic", "Medic")],
            Credentials {
                access_token: AccessToken::new("access-secret"),
                refresh_token: RefreshToken::new("refresh-secret"),
                expires_at: PhysicalTime::from_secs(100),
            },
        )
    }

    #[test]
    fn tokens_are_redacted_in_debug_output() {
        let rendered = format!("{:?}", identity());
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn authorization_context_copies_profile() {
        let context = identity().authorization_context();
        assert_eq!(context.role(), Role::Crew);
        assert!(context.has_capability("tickets.scan"));
        assert!(!context.has_capability("tickets.void"));
        assert!(context.has_specialty("medic"));
    }

    #[test]
    fn renewal_keeps_refresh_token_when_grant_omits_it() {
        let current = identity().credentials().clone();
        let renewed = current.renewed(CredentialGrant {
            access_token: AccessToken::new("next"),
            refresh_token: None,
            expires_at: PhysicalTime::from_secs(200),
        });
        assert_eq!(renewed.access_token.expose(), "next");
        assert_eq!(renewed.refresh_token, current.refresh_token);
        assert!(renewed.is_expired_at(PhysicalTime::from_secs(200)));
        assert!(!renewed.is_expired_at(PhysicalTime::from_secs(199)));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Management).unwrap(), "\"management\"");
        assert!(serde_json::from_str::<Role>("\"pilot\"").is_err());
    }
}
