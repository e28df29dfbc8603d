//! Session identity service
//!
//! Owns the credential state of the paired device. The profile (role,
//! capabilities, specialties) is fixed for the life of a session; only the
//! credential triple changes, and only through [`apply_renewal`].
//!
//! The triple is held as one `Arc<Credentials>` and replaced whole under a
//! short write lock, so a reader sees either the old triple or the new one.
//!
//! [`apply_renewal`]: SessionIdentityService::apply_renewal

use crate::errors::RenewalError;
use arealink_core::{
    AccessToken, AuthorizationContext, CredentialGrant, Credentials, IdentityProfile,
    IdentitySnapshot, PhysicalTime, Role, SessionIdentity, Snapshot, SnapshotError,
    SnapshotHeader, Snapshotable, Specialty,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Lifecycle state of the service at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No identity loaded
    Unbooted,
    /// Identity loaded and the access token is still valid
    Active,
    /// Identity loaded but the access token has expired; reads still work
    Expired,
}

/// Credentials together with the generation they were read at
#[derive(Debug, Clone)]
pub struct CredentialLease {
    /// The credential triple
    pub credentials: Arc<Credentials>,
    /// Generation counter value when the triple was read
    pub generation: u64,
}

#[derive(Debug)]
struct Installed {
    profile: Arc<IdentityProfile>,
    credentials: Arc<Credentials>,
}

#[derive(Debug, Default)]
struct ServiceState {
    session: Option<Installed>,
    generation: u64,
}

/// Owner of the paired device's identity
#[derive(Debug, Default)]
pub struct SessionIdentityService {
    state: RwLock<ServiceState>,
}

impl SessionIdentityService {
    /// Unbooted service
    pub fn new() -> Self {
        Self::default()
    }

    /// Active service for an identity granted by a completed pairing
    pub fn from_identity(identity: SessionIdentity) -> Self {
        let service = Self::new();
        service.install(identity);
        service
    }

    /// Boot from a stored snapshot, returning the installed profile.
    ///
    /// Fails with `IncompleteSnapshot` naming every missing field; the
    /// service stays as it was.
    pub fn boot_from_snapshot(
        &self,
        snapshot: IdentitySnapshot,
    ) -> Result<Arc<IdentityProfile>, SnapshotError> {
        let identity = snapshot.into_identity()?;
        let profile = identity.profile().clone();
        self.install(identity);
        Ok(profile)
    }

    fn install(&self, identity: SessionIdentity) {
        let (profile, credentials) = identity.into_parts();
        let mut state = self.state.write();
        state.generation += 1;
        state.session = Some(Installed {
            profile,
            credentials: Arc::new(credentials),
        });
        debug!(generation = state.generation, "Session identity installed");
    }

    /// State at `now`
    pub fn status_at(&self, now: PhysicalTime) -> SessionStatus {
        match &self.state.read().session {
            None => SessionStatus::Unbooted,
            Some(installed) if installed.credentials.is_expired_at(now) => SessionStatus::Expired,
            Some(_) => SessionStatus::Active,
        }
    }

    /// Whether `now` falls inside the renewal window `skew` before expiry.
    ///
    /// Always `false` when unbooted.
    pub fn needs_renewal_at(&self, now: PhysicalTime, skew: Duration) -> bool {
        self.state
            .read()
            .session
            .as_ref()
            .is_some_and(|installed| now >= installed.credentials.expires_at.saturating_sub(skew))
    }

    /// Whether an identity is loaded
    pub fn is_booted(&self) -> bool {
        self.state.read().session.is_some()
    }

    /// Assigned role
    pub fn role(&self) -> Option<Role> {
        self.read_profile(|profile| profile.role())
    }

    /// Granted capabilities
    pub fn capabilities(&self) -> Option<BTreeSet<String>> {
        self.read_profile(|profile| profile.capabilities().clone())
    }

    /// Qualified specialties
    pub fn specialties(&self) -> Option<Vec<Specialty>> {
        self.read_profile(|profile| profile.specialties().to_vec())
    }

    /// Entry application the identity was granted through
    pub fn application_id(&self) -> Option<String> {
        self.read_profile(|profile| profile.application_id().to_string())
    }

    /// Shared profile
    pub fn profile(&self) -> Option<Arc<IdentityProfile>> {
        self.read_profile(Arc::clone)
    }

    /// Current access token
    pub fn access_token(&self) -> Option<AccessToken> {
        self.credentials()
            .map(|credentials| credentials.access_token.clone())
    }

    /// Current access token expiry
    pub fn expires_at(&self) -> Option<PhysicalTime> {
        self.credentials().map(|credentials| credentials.expires_at)
    }

    /// Current credential triple, read as one value
    pub fn credentials(&self) -> Option<Arc<Credentials>> {
        self.state
            .read()
            .session
            .as_ref()
            .map(|installed| installed.credentials.clone())
    }

    /// Current credential triple and the generation it belongs to
    pub fn lease(&self) -> Option<CredentialLease> {
        let state = self.state.read();
        state.session.as_ref().map(|installed| CredentialLease {
            credentials: installed.credentials.clone(),
            generation: state.generation,
        })
    }

    /// Counter bumped on every install, renewal and teardown
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Full identity, profile and current credentials
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.state.read().session.as_ref().map(|installed| {
            SessionIdentity::from_parts(
                installed.profile.clone(),
                installed.credentials.as_ref().clone(),
            )
        })
    }

    /// Role appropriation for the loaded identity
    pub fn authorization_context(&self) -> Option<AuthorizationContext> {
        self.read_profile(|profile| profile.authorization_context())
    }

    /// Swap in renewed credentials.
    ///
    /// The triple is replaced as a whole; the profile is untouched.
    pub fn apply_renewal(&self, grant: CredentialGrant) -> Result<Arc<Credentials>, RenewalError> {
        self.swap_credentials(grant).map(|lease| lease.credentials)
    }

    /// Swap in renewed credentials, returning them with the generation the
    /// swap produced
    pub fn swap_credentials(&self, grant: CredentialGrant) -> Result<CredentialLease, RenewalError> {
        let mut state = self.state.write();
        let installed = state.session.as_mut().ok_or(RenewalError::NotBooted)?;
        let renewed = Arc::new(installed.credentials.renewed(grant));
        installed.credentials = renewed.clone();
        state.generation += 1;
        debug!(generation = state.generation, expires_at = %renewed.expires_at, "Credentials swapped");
        Ok(CredentialLease {
            credentials: renewed,
            generation: state.generation,
        })
    }

    /// Drop the loaded identity; `false` when already unbooted
    pub fn teardown(&self) -> bool {
        let mut state = self.state.write();
        let was_booted = state.session.take().is_some();
        if was_booted {
            state.generation += 1;
            debug!(generation = state.generation, "Session identity torn down");
        }
        was_booted
    }

    fn read_profile<R>(&self, f: impl FnOnce(&Arc<IdentityProfile>) -> R) -> Option<R> {
        self.state
            .read()
            .session
            .as_ref()
            .map(|installed| f(&installed.profile))
    }
}

impl Snapshotable for SessionIdentityService {
    type Snapshot = IdentitySnapshot;

    fn capture_snapshot(&self, header: SnapshotHeader) -> Result<IdentitySnapshot, SnapshotError> {
        self.identity()
            .map(|identity| identity.to_snapshot(header))
            .ok_or(SnapshotError::UnloadedEntry {
                kind: IdentitySnapshot::KIND,
            })
    }

    fn restore_snapshot(&self, snapshot: IdentitySnapshot) -> Result<(), SnapshotError> {
        self.boot_from_snapshot(snapshot).map(|_| ())
    }
}
