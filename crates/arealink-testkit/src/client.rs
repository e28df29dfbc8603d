//! Scripted Area client
//!
//! Each endpoint replays a queue of responses pushed by the test. An empty
//! queue answers `Unreachable`. Endpoints can be paused so tests can hold a
//! request in flight while other tasks pile up behind it.

use arealink_core::{
    ApiResponse, AreaClient, AreaCode, CredentialGrant, EntryApplication, EntryForm, EntryGrant,
    EntrySubmission, NetworkError, RefreshToken,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

type Scripted<T> = VecDeque<Result<ApiResponse<T>, NetworkError>>;

/// Area endpoint, for pausing and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `get_entry_form_fields`
    EntryForm,
    /// `submit_entry_form`
    SubmitEntry,
    /// `check_for_entry_verdict`
    EntryVerdict,
    /// `refresh_credentials`
    Refresh,
}

#[derive(Debug, Default)]
struct Script {
    forms: Scripted<EntryForm>,
    submissions: Scripted<EntryApplication>,
    verdicts: Scripted<EntryGrant>,
    refreshes: Scripted<CredentialGrant>,
    calls: HashMap<Endpoint, usize>,
    submitted: Vec<EntrySubmission>,
    presented_refresh_tokens: Vec<String>,
}

/// Scripted [`AreaClient`] for tests
#[derive(Debug, Clone)]
pub struct MockAreaClient {
    script: Arc<Mutex<Script>>,
    gates: Arc<HashMap<Endpoint, watch::Sender<bool>>>,
}

impl Default for MockAreaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn unscripted<T>(endpoint: Endpoint) -> Result<ApiResponse<T>, NetworkError> {
    Err(NetworkError::unreachable(format!(
        "no scripted response for {endpoint:?}"
    )))
}

impl MockAreaClient {
    /// Client with empty scripts and every endpoint open
    pub fn new() -> Self {
        let gates = [
            Endpoint::EntryForm,
            Endpoint::SubmitEntry,
            Endpoint::EntryVerdict,
            Endpoint::Refresh,
        ]
        .into_iter()
        .map(|endpoint| (endpoint, watch::channel(true).0))
        .collect();
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            gates: Arc::new(gates),
        }
    }

    /// Queue a response for `get_entry_form_fields`
    pub fn push_entry_form(&self, response: Result<ApiResponse<EntryForm>, NetworkError>) {
        self.script.lock().forms.push_back(response);
    }

    /// Queue a response for `submit_entry_form`
    pub fn push_submission(&self, response: Result<ApiResponse<EntryApplication>, NetworkError>) {
        self.script.lock().submissions.push_back(response);
    }

    /// Queue a response for `check_for_entry_verdict`
    pub fn push_verdict(&self, response: Result<ApiResponse<EntryGrant>, NetworkError>) {
        self.script.lock().verdicts.push_back(response);
    }

    /// Queue a response for `refresh_credentials`
    pub fn push_refresh(&self, response: Result<ApiResponse<CredentialGrant>, NetworkError>) {
        self.script.lock().refreshes.push_back(response);
    }

    /// Hold requests to `endpoint` until [`resume`](Self::resume)
    pub fn pause(&self, endpoint: Endpoint) {
        if let Some(gate) = self.gates.get(&endpoint) {
            gate.send_replace(false);
        }
    }

    /// Release held requests to `endpoint`
    pub fn resume(&self, endpoint: Endpoint) {
        if let Some(gate) = self.gates.get(&endpoint) {
            gate.send_replace(true);
        }
    }

    /// Requests received by `endpoint`, counted on arrival
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.script.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Every submitted entry form, in order
    pub fn submitted(&self) -> Vec<EntrySubmission> {
        self.script.lock().submitted.clone()
    }

    /// Every refresh token presented, in order
    pub fn presented_refresh_tokens(&self) -> Vec<String> {
        self.script.lock().presented_refresh_tokens.clone()
    }

    /// Yield until `endpoint` has received `count` requests
    pub async fn wait_for_calls(&self, endpoint: Endpoint, count: usize) {
        while self.calls(endpoint) < count {
            tokio::task::yield_now().await;
        }
    }

    fn arrive(&self, endpoint: Endpoint) {
        *self.script.lock().calls.entry(endpoint).or_insert(0) += 1;
        trace!(?endpoint, "Mock Area request");
    }

    async fn pass_gate(&self, endpoint: Endpoint) {
        let Some(gate) = self.gates.get(&endpoint) else {
            return;
        };
        let mut open = gate.subscribe();
        while !*open.borrow_and_update() {
            if open.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl AreaClient for MockAreaClient {
    async fn get_entry_form_fields(
        &self,
        _area: &AreaCode,
    ) -> Result<ApiResponse<EntryForm>, NetworkError> {
        self.arrive(Endpoint::EntryForm);
        self.pass_gate(Endpoint::EntryForm).await;
        let next = self.script.lock().forms.pop_front();
        next.unwrap_or_else(|| unscripted(Endpoint::EntryForm))
    }

    async fn submit_entry_form(
        &self,
        _area: &AreaCode,
        submission: &EntrySubmission,
    ) -> Result<ApiResponse<EntryApplication>, NetworkError> {
        self.arrive(Endpoint::SubmitEntry);
        self.script.lock().submitted.push(submission.clone());
        self.pass_gate(Endpoint::SubmitEntry).await;
        let next = self.script.lock().submissions.pop_front();
        next.unwrap_or_else(|| unscripted(Endpoint::SubmitEntry))
    }

    async fn check_for_entry_verdict(
        &self,
        _application_id: &str,
    ) -> Result<ApiResponse<EntryGrant>, NetworkError> {
        self.arrive(Endpoint::EntryVerdict);
        self.pass_gate(Endpoint::EntryVerdict).await;
        let next = self.script.lock().verdicts.pop_front();
        next.unwrap_or_else(|| unscripted(Endpoint::EntryVerdict))
    }

    async fn refresh_credentials(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<ApiResponse<CredentialGrant>, NetworkError> {
        self.arrive(Endpoint::Refresh);
        self.script
            .lock()
            .presented_refresh_tokens
            .push(refresh_token.expose().to_string());
        self.pass_gate(Endpoint::Refresh).await;
        let next = self.script.lock().refreshes.pop_front();
        next.unwrap_or_else(|| unscripted(Endpoint::Refresh))
    }
}
