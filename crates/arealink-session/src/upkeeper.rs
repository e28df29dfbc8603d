//! Session identity upkeeper
//!
//! Keeps the access token valid without caller involvement. Renewal is
//! triggered by a scheduled expiry check, by a wrapped call answering 401,
//! or explicitly.
//!
//! At most one refresh is in flight. Every trigger records the credential
//! generation it saw before waiting on the renewal lock; if the generation has
//! moved by the time it gets the lock, somebody else already renewed and the
//! trigger reuses that result instead of calling the Area again.

use crate::errors::{AreaError, RenewalError};
use crate::identity::{CredentialLease, SessionIdentityService};
use crate::memento::MementoAgent;
use arealink_core::{
    AccessToken, ApiResponse, AreaClient, CredentialGrant, Credentials, NetworkError,
    PhysicalTime, PhysicalTimeEffects, RetryPolicy,
};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Lifecycle notifications from the upkeeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were renewed
    Renewed {
        /// Generation of the new credentials
        generation: u64,
        /// New expiry
        expires_at: PhysicalTime,
    },
    /// The Area rejected the refresh token; the session and its stored
    /// snapshot are gone
    LoggedOut,
    /// Renewal kept failing; the session is gone and the device must pair
    /// again
    OnboardingRequired,
}

type TeardownHook = Box<dyn Fn(&SessionEvent) + Send + Sync>;

enum RefreshFailure {
    Rejected(NetworkError),
    Transient(NetworkError),
}

fn classify(
    response: Result<ApiResponse<CredentialGrant>, NetworkError>,
) -> Result<CredentialGrant, RefreshFailure> {
    match response.and_then(ApiResponse::into_result) {
        Ok(grant) => Ok(grant),
        Err(err) if err.is_transient() => Err(RefreshFailure::Transient(err)),
        Err(err) => Err(RefreshFailure::Rejected(err)),
    }
}

/// Background renewal policy for one session
pub struct Upkeeper {
    service: Arc<SessionIdentityService>,
    memento: MementoAgent<SessionIdentityService>,
    client: Arc<dyn AreaClient>,
    time: Arc<dyn PhysicalTimeEffects>,
    policy: RetryPolicy,
    skew: Duration,
    renewal_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    on_teardown: Mutex<Option<TeardownHook>>,
}

impl Upkeeper {
    /// Upkeeper renewing `service` and persisting it through `memento`
    pub fn new(
        service: Arc<SessionIdentityService>,
        memento: MementoAgent<SessionIdentityService>,
        client: Arc<dyn AreaClient>,
        time: Arc<dyn PhysicalTimeEffects>,
        policy: RetryPolicy,
        skew: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            memento,
            client,
            time,
            policy,
            skew,
            renewal_lock: tokio::sync::Mutex::new(()),
            events,
            on_teardown: Mutex::new(None),
        }
    }

    /// Call `hook` whenever renewal ends the session
    pub fn set_teardown_hook(&self, hook: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        *self.on_teardown.lock() = Some(Box::new(hook));
    }

    /// Receive lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The renewed service
    pub fn service(&self) -> &Arc<SessionIdentityService> {
        &self.service
    }

    /// The agent persisting the service
    pub fn memento(&self) -> &MementoAgent<SessionIdentityService> {
        &self.memento
    }

    /// Renewal lead time
    pub fn skew(&self) -> Duration {
        self.skew
    }

    /// Renew now, unless a renewal completes while this call waits its turn
    pub async fn renew(&self) -> Result<Arc<Credentials>, RenewalError> {
        let lease = self.service.lease().ok_or(RenewalError::NotBooted)?;
        self.renew_after(lease.generation).await
    }

    /// Current credentials, renewed first when inside the renewal window
    pub async fn fresh_credentials(&self) -> Result<Arc<Credentials>, RenewalError> {
        self.fresh_lease().await.map(|lease| lease.credentials)
    }

    /// Like [`fresh_credentials`](Self::fresh_credentials), together with
    /// the generation the credentials belong to
    pub async fn fresh_lease(&self) -> Result<CredentialLease, RenewalError> {
        let lease = self.service.lease().ok_or(RenewalError::NotBooted)?;
        let now = self.time.physical_time().await?;
        if now >= lease.credentials.expires_at.saturating_sub(self.skew) {
            self.renew_lease_after(lease.generation).await
        } else {
            Ok(lease)
        }
    }

    /// Scheduled check: renew when inside the renewal window.
    ///
    /// Returns the renewed credentials, or `None` when no renewal was due.
    pub async fn check_once(&self) -> Result<Option<Arc<Credentials>>, RenewalError> {
        let now = self.time.physical_time().await?;
        if !self.service.is_booted() {
            return Err(RenewalError::NotBooted);
        }
        if !self.service.needs_renewal_at(now, self.skew) {
            debug!(now = %now, "Credentials fresh, renewal skipped");
            return Ok(None);
        }
        self.renew().await.map(Some)
    }

    /// Run [`check_once`](Self::check_once) every `interval` until the
    /// session ends or the upkeeper is dropped
    pub fn spawn_scheduled_checks(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let time = self.time.clone();
        let interval_ms = interval.as_millis() as u64;
        tokio::spawn(async move {
            loop {
                if let Err(err) = time.sleep_ms(interval_ms).await {
                    warn!(error = %err, "Scheduled renewal check could not sleep");
                }
                let Some(upkeeper) = weak.upgrade() else {
                    break;
                };
                match upkeeper.check_once().await {
                    Ok(_) => {}
                    Err(RenewalError::Time(err)) => {
                        warn!(error = %err, "Scheduled renewal check could not read the clock");
                    }
                    Err(err) => {
                        debug!(error = %err, "Scheduled renewal checks stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Wait for any in-flight renewal to settle, then drop the session.
    ///
    /// Once this returns no renewal of this upkeeper can write the identity
    /// key again.
    pub async fn retire(&self) {
        let _guard = self.renewal_lock.lock().await;
        if self.service.teardown() {
            debug!("Upkeeper retired");
        }
    }

    /// Renew unless the credentials have moved past `observed` generation
    pub async fn renew_after(&self, observed: u64) -> Result<Arc<Credentials>, RenewalError> {
        self.renew_lease_after(observed)
            .await
            .map(|lease| lease.credentials)
    }

    async fn renew_lease_after(&self, observed: u64) -> Result<CredentialLease, RenewalError> {
        let _guard = self.renewal_lock.lock().await;

        let lease = self.service.lease().ok_or(RenewalError::NotBooted)?;
        if lease.generation != observed {
            debug!(
                observed,
                generation = lease.generation,
                "Renewal already completed by another caller"
            );
            return Ok(lease);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .client
                .refresh_credentials(&lease.credentials.refresh_token)
                .await;

            let last = match classify(response) {
                Ok(grant) => return self.complete(grant).await,
                Err(RefreshFailure::Rejected(err)) => {
                    self.end_session(SessionEvent::LoggedOut).await;
                    return Err(RenewalError::Rejected(err));
                }
                Err(RefreshFailure::Transient(err)) => err,
            };

            if attempt >= self.policy.max_attempts {
                warn!(attempt, error = %last, "Renewal attempts exhausted");
                self.end_session(SessionEvent::OnboardingRequired).await;
                return Err(RenewalError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }

            let delay = self.policy.calculate_delay(attempt - 1);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %last, "Renewal failed, retrying");
            self.time.sleep_ms(delay.as_millis() as u64).await?;
        }
    }

    async fn complete(&self, grant: CredentialGrant) -> Result<CredentialLease, RenewalError> {
        let lease = self.service.swap_credentials(grant)?;
        let generation = lease.generation;

        if let Err(err) = self.memento.capture().await {
            warn!(key = self.memento.key(), error = %err, "Renewed credentials were not persisted");
        }
        if self.service.generation() != generation {
            debug!(generation, "Session ended while renewed credentials were stored");
            return Err(RenewalError::NotBooted);
        }

        let expires_at = lease.credentials.expires_at;
        info!(generation, expires_at = %expires_at, "Session credentials renewed");
        let _ = self.events.send(SessionEvent::Renewed {
            generation,
            expires_at,
        });
        Ok(lease)
    }

    async fn end_session(&self, event: SessionEvent) {
        self.service.teardown();
        if event == SessionEvent::LoggedOut {
            if let Err(err) = self.memento.remove().await {
                warn!(key = self.memento.key(), error = %err, "Stored session could not be removed");
            }
            info!("Refresh token rejected, session logged out");
        } else {
            info!("Session torn down, onboarding required");
        }

        let _ = self.events.send(event.clone());
        if let Some(hook) = self.on_teardown.lock().as_ref() {
            hook(&event);
        }
    }
}

impl fmt::Debug for Upkeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upkeeper")
            .field("memento", &self.memento)
            .field("policy", &self.policy)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

/// Runs Area requests with the current access token, renewing around them
#[derive(Debug, Clone)]
pub struct AuthorizedCaller {
    upkeeper: Arc<Upkeeper>,
}

impl AuthorizedCaller {
    /// Caller backed by `upkeeper`
    pub fn new(upkeeper: Arc<Upkeeper>) -> Self {
        Self { upkeeper }
    }

    /// Run `request` with a valid access token.
    ///
    /// Renews first when the token is inside the renewal window. A 401
    /// answer triggers one renewal and one replay; a second 401 is returned
    /// to the caller as is.
    pub async fn call<T, F, Fut>(&self, request: F) -> Result<ApiResponse<T>, AreaError>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<ApiResponse<T>, NetworkError>>,
    {
        let lease = self.upkeeper.fresh_lease().await?;
        let generation = lease.generation;

        let response = request(lease.credentials.access_token.clone()).await?;
        if !response.is_unauthenticated() {
            return Ok(response);
        }

        debug!(generation, "Request unauthenticated, renewing before replay");
        let renewed = self.upkeeper.renew_after(generation).await?;
        Ok(request(renewed.access_token.clone()).await?)
    }
}
