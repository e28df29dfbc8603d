//! Onboarding: pairing a device to an Area
//!
//! The handshake is three calls: fetch the entry form, submit the answers,
//! then poll for a verdict. A submitted application is persisted so a
//! restarted process can keep polling it.
//!
//! Every call is guarded by a soft timeout and a cooperative cancel flag.
//! The soft timeout only offers the user a way out; the call keeps running.
//! Cancelling never aborts a call either; its result is discarded when it
//! arrives.

use crate::errors::OnboardingError;
use crate::memento::MementoAgent;
use arealink_core::snapshot::keys;
use arealink_core::{
    ApiResponse, AreaClient, AreaCode, Credentials, DomainError, EntryApplication, EntryForm,
    EntrySubmission, NetworkError, OnboardingSnapshot, PhysicalTimeEffects, SecureTextStore,
    SessionIdentity, Snapshot, SnapshotError, SnapshotHeader, Snapshotable,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

const NOTICE_CAPACITY: usize = 8;

/// Prompts for the UI while a pairing call is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingNotice {
    /// The call outlasted the soft timeout; offer the user a cancel option
    OfferCancel {
        /// Which call is slow
        operation: &'static str,
    },
}

/// Cooperative cancellation flag shared between the UI and the flow
#[derive(Debug, Clone)]
pub struct PairingCancel {
    continue_on: Arc<AtomicBool>,
}

impl Default for PairingCancel {
    fn default() -> Self {
        Self {
            continue_on: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl PairingCancel {
    /// Request cancellation of the running call
    pub fn cancel(&self) {
        self.continue_on.store(false, Ordering::SeqCst);
    }

    /// Allow calls again
    pub fn reset(&self) {
        self.continue_on.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        !self.continue_on.load(Ordering::SeqCst)
    }
}

/// Submitted entry application awaiting a verdict
#[derive(Debug, Default)]
pub struct PendingApplication {
    application: RwLock<Option<EntryApplication>>,
}

impl PendingApplication {
    /// The pending application, if any
    pub fn get(&self) -> Option<EntryApplication> {
        self.application.read().clone()
    }

    fn set(&self, application: EntryApplication) {
        *self.application.write() = Some(application);
    }

    fn clear(&self) {
        *self.application.write() = None;
    }
}

impl Snapshotable for PendingApplication {
    type Snapshot = OnboardingSnapshot;

    fn capture_snapshot(&self, header: SnapshotHeader) -> Result<OnboardingSnapshot, SnapshotError> {
        let application = self.get().ok_or(SnapshotError::UnloadedEntry {
            kind: OnboardingSnapshot::KIND,
        })?;
        Ok(OnboardingSnapshot {
            header,
            area_name: Some(application.area_name),
            application_id: Some(application.application_id),
            application_expires_at: Some(application.expires_at),
        })
    }

    fn restore_snapshot(&self, snapshot: OnboardingSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;
        if let OnboardingSnapshot {
            area_name: Some(area_name),
            application_id: Some(application_id),
            application_expires_at: Some(expires_at),
            ..
        } = snapshot
        {
            self.set(EntryApplication {
                application_id,
                area_name,
                expires_at,
            });
        }
        Ok(())
    }
}

/// Identity granted by a positive verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedIdentity {
    /// The new session identity
    pub identity: SessionIdentity,
    /// Name of the Area that granted it
    pub area_name: String,
}

/// Drives the onboarding handshake for one device
pub struct PairingFlow {
    client: Arc<dyn AreaClient>,
    time: Arc<dyn PhysicalTimeEffects>,
    pending: Arc<PendingApplication>,
    memento: MementoAgent<PendingApplication>,
    soft_timeout: Duration,
    cancel: PairingCancel,
    notices: broadcast::Sender<OnboardingNotice>,
}

impl PairingFlow {
    /// Flow persisting its pending application in `store`
    pub fn new(
        client: Arc<dyn AreaClient>,
        store: Arc<dyn SecureTextStore>,
        time: Arc<dyn PhysicalTimeEffects>,
        soft_timeout: Duration,
    ) -> Self {
        let pending = Arc::new(PendingApplication::default());
        let memento = MementoAgent::new(pending.clone(), keys::ONBOARDING, store, time.clone());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            client,
            time,
            pending,
            memento,
            soft_timeout,
            cancel: PairingCancel::default(),
            notices,
        }
    }

    /// Handle for cancelling the running call
    pub fn cancel_handle(&self) -> PairingCancel {
        self.cancel.clone()
    }

    /// Receive soft-timeout notices
    pub fn notices(&self) -> broadcast::Receiver<OnboardingNotice> {
        self.notices.subscribe()
    }

    /// The pending application, if any
    pub fn pending(&self) -> Option<EntryApplication> {
        self.pending.get()
    }

    /// Reload a pending application persisted by an earlier process
    pub async fn resume_pending(&self) -> Result<Option<EntryApplication>, OnboardingError> {
        match self.memento.restore().await {
            Ok(()) => {
                let pending = self.pending.get();
                if let Some(application) = &pending {
                    info!(application_id = %application.application_id, "Resumed pending entry application");
                }
                Ok(pending)
            }
            Err(err) if err.is_missing_entry() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch the entry form of the Area behind `area`
    pub async fn fetch_entry_form(&self, area: &AreaCode) -> Result<EntryForm, OnboardingError> {
        let response = self
            .guarded("get_entry_form_fields", self.client.get_entry_form_fields(area))
            .await?;
        let form = match response {
            ApiResponse::Forbidden => return Err(DomainError::AreaClosed.into()),
            other => other.into_result()?,
        };
        debug!(area = %area, fields = form.fields.len(), "Entry form fetched");
        Ok(form)
    }

    /// Validate `answers` against `form` and submit them.
    ///
    /// The returned application is persisted before this returns.
    pub async fn submit_entry_form(
        &self,
        area: &AreaCode,
        form: &EntryForm,
        answers: BTreeMap<String, String>,
    ) -> Result<EntryApplication, OnboardingError> {
        let missing: Vec<String> = form
            .fields
            .iter()
            .filter(|field| field.required)
            .filter(|field| {
                answers
                    .get(&field.key)
                    .map_or(true, |answer| answer.trim().is_empty())
            })
            .map(|field| field.key.clone())
            .collect();
        if !missing.is_empty() {
            return Err(OnboardingError::InvalidAnswers { missing });
        }

        let submission = EntrySubmission { answers };
        let response = self
            .guarded(
                "submit_entry_form",
                self.client.submit_entry_form(area, &submission),
            )
            .await?;
        let application = match response {
            ApiResponse::Forbidden => return Err(DomainError::AreaClosed.into()),
            other => other.into_result()?,
        };

        self.pending.set(application.clone());
        self.memento.capture().await?;
        info!(
            application_id = %application.application_id,
            area_name = %application.area_name,
            "Entry application submitted"
        );
        Ok(application)
    }

    /// Ask the Area whether the pending application was granted.
    ///
    /// A granted or refused application is no longer pending; an undecided
    /// one stays and can be polled again.
    pub async fn check_for_entry_verdict(&self) -> Result<PairedIdentity, OnboardingError> {
        let application = self
            .pending
            .get()
            .ok_or(OnboardingError::NoPendingApplication)?;
        let rejected = || DomainError::RejectedApplication {
            application_id: application.application_id.clone(),
        };

        let now = self.time.physical_time().await?;
        if now >= application.expires_at {
            info!(application_id = %application.application_id, "Entry application lapsed");
            self.forget_pending().await?;
            return Err(rejected().into());
        }

        let response = self
            .guarded(
                "check_for_entry_verdict",
                self.client
                    .check_for_entry_verdict(&application.application_id),
            )
            .await?;

        let grant = match response {
            ApiResponse::Ok(grant) => grant,
            ApiResponse::NoContent => {
                return Err(DomainError::UndecidedApplication {
                    application_id: application.application_id.clone(),
                }
                .into())
            }
            ApiResponse::Forbidden => {
                info!(application_id = %application.application_id, "Entry application rejected");
                self.forget_pending().await?;
                return Err(rejected().into());
            }
            other => other.into_result()?,
        };

        let refresh_token = grant
            .credentials
            .refresh_token
            .ok_or_else(|| NetworkError::UnexpectedResponse {
                status: 200,
                payload: "entry grant without a refresh token".to_string(),
            })?;
        let identity = SessionIdentity::new(
            application.application_id.clone(),
            grant.role,
            grant.capabilities,
            grant.specialties,
            Credentials {
                access_token: grant.credentials.access_token,
                refresh_token,
                expires_at: grant.credentials.expires_at,
            },
        );

        self.forget_pending().await?;
        info!(
            application_id = %application.application_id,
            role = %identity.role(),
            "Entry application granted"
        );
        Ok(PairedIdentity {
            identity,
            area_name: application.area_name,
        })
    }

    async fn forget_pending(&self) -> Result<(), OnboardingError> {
        self.pending.clear();
        self.memento.remove().await?;
        Ok(())
    }

    /// Await `call`, offering a cancel option once the soft timeout passes,
    /// and discard the result if cancellation was requested meanwhile.
    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<ApiResponse<T>, NetworkError>>,
    ) -> Result<ApiResponse<T>, OnboardingError> {
        tokio::pin!(call);
        let soft_timeout_ms = self.soft_timeout.as_millis() as u64;

        let result = tokio::select! {
            biased;
            result = &mut call => result,
            timer = self.time.sleep_ms(soft_timeout_ms) => {
                if timer.is_ok() {
                    debug!(operation, "Pairing call outlasted soft timeout");
                    let _ = self.notices.send(OnboardingNotice::OfferCancel { operation });
                }
                call.await
            }
        };

        if self.cancel.is_cancelled() {
            debug!(operation, "Pairing call cancelled, result discarded");
            return Err(OnboardingError::Cancelled);
        }
        Ok(result?)
    }
}

impl std::fmt::Debug for PairingFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingFlow")
            .field("pending", &self.pending)
            .field("soft_timeout", &self.soft_timeout)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
