//! Area service client effect
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `arealink-effects` (HTTP), `arealink-testkit` (scripted)
//! - **Usage**: onboarding handshake and credential renewal
//!
//! Every request returns a tagged [`ApiResponse`] for the statuses the Area
//! documents. Failures below HTTP (no route, timeouts, unreadable bodies) are
//! [`NetworkError`]s instead.

use crate::identity::{AccessToken, RefreshToken, Role, Specialty};
use crate::time::PhysicalTime;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Network operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum NetworkError {
    /// The Area could not be reached
    #[error("Area unreachable: {reason}")]
    Unreachable {
        /// Transport failure message
        reason: String,
    },

    /// The request did not complete in time
    #[error("Request '{operation}' timed out")]
    Timeout {
        /// The request that timed out
        operation: String,
    },

    /// The Area refused the request as malformed
    #[error("Bad request: {payload}")]
    BadRequest {
        /// Error body returned by the Area
        payload: String,
    },

    /// The presented credential was not accepted (HTTP 401)
    #[error("Request was not authenticated")]
    Unauthenticated,

    /// The Area refused the request for this identity
    #[error("Request forbidden")]
    Forbidden,

    /// A status or body the client does not understand
    #[error("Unexpected response (status {status}): {payload}")]
    UnexpectedResponse {
        /// HTTP status code
        status: u16,
        /// Body, or a description of why it was unreadable
        payload: String,
    },
}

impl NetworkError {
    /// Create an unreachable error
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Unreachable { .. } | NetworkError::Timeout { .. } => true,
            NetworkError::UnexpectedResponse { status, .. } => *status >= 500,
            NetworkError::BadRequest { .. }
            | NetworkError::Unauthenticated
            | NetworkError::Forbidden => false,
        }
    }
}

/// Tagged result of an Area request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse<T> {
    /// 200 with a decoded body
    Ok(T),
    /// 400 with the Area's error body
    BadRequest(String),
    /// 403
    Forbidden,
    /// 204
    NoContent,
    /// Any other status
    Undocumented {
        /// HTTP status code
        status: u16,
        /// Raw body
        payload: String,
    },
}

impl<T> ApiResponse<T> {
    /// Whether the Area rejected the presented access token
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiResponse::Undocumented { status: 401, .. })
    }

    /// Map the success body
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        match self {
            ApiResponse::Ok(value) => ApiResponse::Ok(f(value)),
            ApiResponse::BadRequest(payload) => ApiResponse::BadRequest(payload),
            ApiResponse::Forbidden => ApiResponse::Forbidden,
            ApiResponse::NoContent => ApiResponse::NoContent,
            ApiResponse::Undocumented { status, payload } => {
                ApiResponse::Undocumented { status, payload }
            }
        }
    }

    /// Collapse to the success body, turning every other tag into an error
    pub fn into_result(self) -> Result<T, NetworkError> {
        match self {
            ApiResponse::Ok(value) => Ok(value),
            ApiResponse::BadRequest(payload) => Err(NetworkError::BadRequest { payload }),
            ApiResponse::Forbidden => Err(NetworkError::Forbidden),
            ApiResponse::NoContent => Err(NetworkError::UnexpectedResponse {
                status: 204,
                payload: String::new(),
            }),
            ApiResponse::Undocumented { status: 401, .. } => Err(NetworkError::Unauthenticated),
            ApiResponse::Undocumented { status, payload } => {
                Err(NetworkError::UnexpectedResponse { status, payload })
            }
        }
    }
}

/// Short code identifying an Area, as scanned or typed during onboarding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaCode(String);

impl AreaCode {
    /// Wrap a code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The raw code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One question on an Area's entry form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryField {
    /// Answer key
    pub key: String,
    /// Prompt shown to the applicant
    pub label: String,
    /// Whether an answer is mandatory
    #[serde(default)]
    pub required: bool,
}

/// Entry form an Area presents to applicants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryForm {
    /// Display name of the Area
    pub area_name: String,
    /// Questions, in presentation order
    pub fields: Vec<EntryField>,
}

/// Answers submitted for an entry form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySubmission {
    /// Answer per field key
    pub answers: BTreeMap<String, String>,
}

/// A submitted application awaiting a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryApplication {
    /// Identifier used to poll for the verdict
    pub application_id: String,
    /// Area the application was made to
    pub area_name: String,
    /// After this time the application lapses
    pub expires_at: PhysicalTime,
}

/// Fresh or renewed credentials issued by the Area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialGrant {
    /// New access token
    pub access_token: AccessToken,
    /// Rotated refresh token, if the Area rotates them
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
    /// Expiry of `access_token`
    pub expires_at: PhysicalTime,
}

/// Verdict body of a granted entry application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryGrant {
    /// First credential set
    pub credentials: CredentialGrant,
    /// Assigned role
    pub role: Role,
    /// Granted capabilities
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Qualified specialties
    #[serde(default)]
    pub specialties: Vec<Specialty>,
}

/// Request builders of the Area service
#[async_trait]
pub trait AreaClient: Send + Sync {
    /// Entry form of an Area
    async fn get_entry_form_fields(
        &self,
        area: &AreaCode,
    ) -> Result<ApiResponse<EntryForm>, NetworkError>;

    /// Submit answers, opening an entry application
    async fn submit_entry_form(
        &self,
        area: &AreaCode,
        submission: &EntrySubmission,
    ) -> Result<ApiResponse<EntryApplication>, NetworkError>;

    /// Poll an application for its verdict
    async fn check_for_entry_verdict(
        &self,
        application_id: &str,
    ) -> Result<ApiResponse<EntryGrant>, NetworkError>;

    /// Exchange a refresh token for a new access token
    async fn refresh_credentials(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<ApiResponse<CredentialGrant>, NetworkError>;
}

/// Blanket implementation for Arc<T> where T: AreaClient
#[async_trait]
impl<T: AreaClient + ?Sized> AreaClient for Arc<T> {
    async fn get_entry_form_fields(
        &self,
        area: &AreaCode,
    ) -> Result<ApiResponse<EntryForm>, NetworkError> {
        (**self).get_entry_form_fields(area).await
    }

    async fn submit_entry_form(
        &self,
        area: &AreaCode,
        submission: &EntrySubmission,
    ) -> Result<ApiResponse<EntryApplication>, NetworkError> {
        (**self).submit_entry_form(area, submission).await
    }

    async fn check_for_entry_verdict(
        &self,
        application_id: &str,
    ) -> Result<ApiResponse<EntryGrant>, NetworkError> {
        (**self).check_for_entry_verdict(application_id).await
    }

    async fn refresh_credentials(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<ApiResponse<CredentialGrant>, NetworkError> {
        (**self).refresh_credentials(refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undocumented_401_is_unauthenticated() {
        let response: ApiResponse<()> = ApiResponse::Undocumented {
            status: 401,
            payload: String::new(),
        };
        assert!(response.is_unauthenticated());
        assert_eq!(response.into_result(), Err(NetworkError::Unauthenticated));
    }

    #[test]
    fn transient_classification() {
        assert!(NetworkError::unreachable("dns").is_transient());
        assert!(NetworkError::UnexpectedResponse {
            status: 503,
            payload: String::new()
        }
        .is_transient());
        assert!(!NetworkError::Forbidden.is_transient());
        assert!(!NetworkError::UnexpectedResponse {
            status: 418,
            payload: String::new()
        }
        .is_transient());
    }
}
