//! Bootstrap verifier and role appropriator
//!
//! Decides at process start whether a full session can be restored. On
//! success it wires the identity service, its memento agent and upkeeper,
//! derives the [`AuthorizationContext`] and publishes it. On failure it
//! publishes [`SessionPhase::NeedsOnboarding`] and nothing else.
//!
//! Downstream consumers read the context through a [`LateRef`] or by watching
//! the phase. A context is never changed in place: each session backs a fresh
//! [`Late`] cell, and ending the session releases it.

use crate::errors::{BootError, MementoError};
use crate::identity::SessionIdentityService;
use crate::memento::MementoAgent;
use crate::upkeeper::{AuthorizedCaller, SessionEvent, Upkeeper};
use arealink_core::snapshot::keys;
use arealink_core::{
    AreaClient, AuthorizationContext, BootstrapSnapshot, IdentityProfile, Late, LateRef,
    PhysicalTimeEffects, RenewalSettings, SecureTextStore, SessionIdentity, Snapshot,
    SnapshotError, SnapshotHeader, Snapshotable,
};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the device stands, as seen by downstream consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Boot has not been attempted
    PreBoot,
    /// No valid session; the device must pair
    NeedsOnboarding,
    /// A session is active with this context
    Authorized(Arc<AuthorizationContext>),
    /// The session was ended by logout or by a rejected refresh token
    LoggedOut,
}

/// The Area a device is paired with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaBinding {
    /// Display name of the Area
    pub area_name: String,
    /// Service endpoint the device talks to
    pub endpoint: String,
}

#[derive(Debug, Default)]
struct BindingSlot {
    binding: RwLock<Option<AreaBinding>>,
}

impl Snapshotable for BindingSlot {
    type Snapshot = BootstrapSnapshot;

    fn capture_snapshot(&self, header: SnapshotHeader) -> Result<BootstrapSnapshot, SnapshotError> {
        let binding = self
            .binding
            .read()
            .clone()
            .ok_or(SnapshotError::UnloadedEntry {
                kind: BootstrapSnapshot::KIND,
            })?;
        Ok(BootstrapSnapshot {
            header,
            area_name: Some(binding.area_name),
            endpoint: Some(binding.endpoint),
        })
    }

    fn restore_snapshot(&self, snapshot: BootstrapSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;
        if let BootstrapSnapshot {
            area_name: Some(area_name),
            endpoint: Some(endpoint),
            ..
        } = snapshot
        {
            *self.binding.write() = Some(AreaBinding {
                area_name,
                endpoint,
            });
        }
        Ok(())
    }
}

/// Active wiring of one session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    service: Arc<SessionIdentityService>,
    upkeeper: Arc<Upkeeper>,
}

impl SessionHandle {
    /// The identity service
    pub fn service(&self) -> &Arc<SessionIdentityService> {
        &self.service
    }

    /// The session's upkeeper
    pub fn upkeeper(&self) -> &Arc<Upkeeper> {
        &self.upkeeper
    }

    /// Caller that runs Area requests with renewed credentials
    pub fn caller(&self) -> AuthorizedCaller {
        AuthorizedCaller::new(self.upkeeper.clone())
    }
}

struct ActiveSession {
    handle: SessionHandle,
    scheduler: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn stop(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.abort();
        }
        self.handle.service.teardown();
    }

    /// Like `stop`, but lets an in-flight renewal finish its write first
    async fn retire(self) {
        self.handle.upkeeper.retire().await;
        if let Some(scheduler) = self.scheduler {
            scheduler.abort();
        }
    }
}

/// Builder for [`BootstrapVerifier`]
pub struct BootstrapVerifierBuilder {
    store: Arc<dyn SecureTextStore>,
    time: Arc<dyn PhysicalTimeEffects>,
    client: Arc<dyn AreaClient>,
    renewal: RenewalSettings,
    scheduled_checks: bool,
}

impl BootstrapVerifierBuilder {
    /// Renewal policy for sessions this verifier establishes
    pub fn renewal(mut self, renewal: RenewalSettings) -> Self {
        self.renewal = renewal;
        self
    }

    /// Spawn the upkeeper's scheduled expiry checks for each session
    pub fn scheduled_checks(mut self, enabled: bool) -> Self {
        self.scheduled_checks = enabled;
        self
    }

    /// Build the verifier in the pre-boot phase
    pub fn build(self) -> Arc<BootstrapVerifier> {
        let binding = Arc::new(BindingSlot::default());
        let binding_memento = MementoAgent::new(
            binding.clone(),
            keys::BOOTSTRAP,
            self.store.clone(),
            self.time.clone(),
        );
        let (phase, _) = watch::channel(SessionPhase::PreBoot);

        Arc::new_cyclic(|me| BootstrapVerifier {
            me: me.clone(),
            store: self.store,
            time: self.time,
            client: self.client,
            renewal: self.renewal,
            scheduled_checks: self.scheduled_checks,
            binding,
            binding_memento,
            authorization: Mutex::new(Late::new()),
            phase,
            session: Mutex::new(None),
        })
    }
}

/// Restores, establishes and ends sessions, and publishes their context
pub struct BootstrapVerifier {
    me: Weak<BootstrapVerifier>,
    store: Arc<dyn SecureTextStore>,
    time: Arc<dyn PhysicalTimeEffects>,
    client: Arc<dyn AreaClient>,
    renewal: RenewalSettings,
    scheduled_checks: bool,
    binding: Arc<BindingSlot>,
    binding_memento: MementoAgent<BindingSlot>,
    authorization: Mutex<Late<AuthorizationContext>>,
    phase: watch::Sender<SessionPhase>,
    session: Mutex<Option<ActiveSession>>,
}

impl BootstrapVerifier {
    /// Start building a verifier over the given effects
    pub fn builder(
        store: Arc<dyn SecureTextStore>,
        time: Arc<dyn PhysicalTimeEffects>,
        client: Arc<dyn AreaClient>,
    ) -> BootstrapVerifierBuilder {
        BootstrapVerifierBuilder {
            store,
            time,
            client,
            renewal: RenewalSettings::default(),
            scheduled_checks: false,
        }
    }

    /// Restore the stored session and publish its context.
    ///
    /// Any failure publishes `NeedsOnboarding` and backs nothing. An already
    /// active session is returned as is.
    pub async fn boot(&self) -> Result<Arc<AuthorizationContext>, BootError> {
        if let Some(context) = self.authorization() {
            return Ok(context);
        }

        let service = Arc::new(SessionIdentityService::new());
        let memento = self.identity_memento(service.clone());

        let restored = match memento.load().await {
            Ok(snapshot) => service.boot_from_snapshot(snapshot).map_err(BootError::from),
            Err(err) => Err(BootError::from(err)),
        };
        let profile = match restored {
            Ok(profile) => profile,
            Err(err) => {
                info!(error = %err, "No valid session, onboarding required");
                self.phase.send_replace(SessionPhase::NeedsOnboarding);
                return Err(err);
            }
        };

        if let Err(err) = self.binding_memento.restore().await {
            debug!(error = %err, "No stored Area binding");
        }

        Ok(self.activate(service, memento, &profile))
    }

    /// Start a session from a completed pairing and persist it
    pub async fn establish(
        &self,
        identity: SessionIdentity,
        binding: AreaBinding,
    ) -> Result<Arc<AuthorizationContext>, MementoError> {
        self.retire_session().await;

        let profile = identity.profile().clone();
        let service = Arc::new(SessionIdentityService::from_identity(identity));
        let memento = self.identity_memento(service.clone()).with_tag("paired");
        memento.capture().await?;

        *self.binding.binding.write() = Some(binding);
        self.binding_memento.capture().await?;

        Ok(self.activate(service, memento, &profile))
    }

    /// End the session and remove its stored snapshots.
    ///
    /// Safe to call without an active session; a later [`boot`](Self::boot)
    /// fails over to onboarding.
    pub async fn logout(&self) -> Result<(), MementoError> {
        self.retire_session().await;

        let identity_removed = self
            .identity_memento(Arc::new(SessionIdentityService::new()))
            .remove()
            .await?;
        *self.binding.binding.write() = None;
        self.binding_memento.remove().await?;

        self.phase.send_replace(SessionPhase::LoggedOut);
        info!(identity_removed, "Logged out");
        Ok(())
    }

    /// Published context of the active session
    pub fn authorization(&self) -> Option<Arc<AuthorizationContext>> {
        self.authorization.lock().get()
    }

    /// Non-owning handle to the current session's context.
    ///
    /// Reports `Unbacked` until a session is established and `Released`
    /// once that session has ended.
    pub fn authorization_ref(&self) -> LateRef<AuthorizationContext> {
        self.authorization.lock().reference()
    }

    /// Watch phase changes
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Wiring of the active session
    pub fn session(&self) -> Option<SessionHandle> {
        self.session
            .lock()
            .as_ref()
            .map(|active| active.handle.clone())
    }

    /// Area the device is paired with, when known
    pub fn binding(&self) -> Option<AreaBinding> {
        self.binding.binding.read().clone()
    }

    fn identity_memento(
        &self,
        service: Arc<SessionIdentityService>,
    ) -> MementoAgent<SessionIdentityService> {
        MementoAgent::new(service, keys::IDENTITY, self.store.clone(), self.time.clone())
    }

    fn activate(
        &self,
        service: Arc<SessionIdentityService>,
        memento: MementoAgent<SessionIdentityService>,
        profile: &IdentityProfile,
    ) -> Arc<AuthorizationContext> {
        let upkeeper = Arc::new(Upkeeper::new(
            service.clone(),
            memento,
            self.client.clone(),
            self.time.clone(),
            self.renewal.retry.policy(),
            self.renewal.skew(),
        ));
        let me = self.me.clone();
        upkeeper.set_teardown_hook(move |event| {
            if let Some(verifier) = me.upgrade() {
                verifier.on_session_ended(event);
            }
        });
        let scheduler = self
            .scheduled_checks
            .then(|| upkeeper.spawn_scheduled_checks(self.renewal.check_interval()));

        let context = Arc::new(profile.authorization_context());
        let late = Late::new();
        if let Err(err) = late.back_shared(context.clone()) {
            warn!(error = %err, "Fresh authorization cell was already backed");
        }
        *self.authorization.lock() = late;
        *self.session.lock() = Some(ActiveSession {
            handle: SessionHandle { service, upkeeper },
            scheduler,
        });

        info!(
            role = %context.role(),
            capabilities = context.capabilities().len(),
            specialties = context.specialties().len(),
            "Session established"
        );
        self.phase
            .send_replace(SessionPhase::Authorized(context.clone()));
        context
    }

    /// Stop the active session and release its context
    fn end_session(&self) {
        if let Some(active) = self.session.lock().take() {
            active.stop();
        }
        *self.authorization.lock() = Late::new();
    }

    async fn retire_session(&self) {
        let active = self.session.lock().take();
        *self.authorization.lock() = Late::new();
        if let Some(active) = active {
            active.retire().await;
        }
    }

    // Runs under the upkeeper's renewal lock, so it must not wait on it.
    fn on_session_ended(&self, event: &SessionEvent) {
        let phase = match event {
            SessionEvent::LoggedOut => SessionPhase::LoggedOut,
            SessionEvent::OnboardingRequired => SessionPhase::NeedsOnboarding,
            SessionEvent::Renewed { .. } => return,
        };
        self.end_session();
        info!(?phase, "Session ended by upkeeper");
        self.phase.send_replace(phase);
    }
}

impl std::fmt::Debug for BootstrapVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapVerifier")
            .field("phase", &*self.phase.borrow())
            .field("renewal", &self.renewal)
            .field("scheduled_checks", &self.scheduled_checks)
            .finish_non_exhaustive()
    }
}
