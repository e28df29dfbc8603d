//! HTTP Area client
//!
//! JSON over HTTP. Status mapping: 200/201 decode into `ApiResponse::Ok`,
//! 204 is `NoContent`, 400 `BadRequest`, 403 `Forbidden`, anything else is
//! `Undocumented` with the raw body. Transport failures become
//! `NetworkError::Timeout` or `NetworkError::Unreachable`.

use arealink_core::{
    ApiResponse, AreaClient, AreaCode, CredentialGrant, EntryApplication, EntryForm, EntryGrant,
    EntrySubmission, NetworkError, RefreshToken,
};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// `AreaClient` speaking to a live Area over HTTP
#[derive(Debug, Clone)]
pub struct HttpAreaClient {
    http: Client,
    base: Url,
}

impl HttpAreaClient {
    /// Create a client for the Area API rooted at `endpoint`
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, NetworkError> {
        let base = Url::parse(endpoint).map_err(|e| NetworkError::BadRequest {
            payload: format!("invalid endpoint {endpoint}: {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(NetworkError::BadRequest {
                payload: format!("endpoint {endpoint} cannot carry request paths"),
            });
        }
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NetworkError::unreachable(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { http, base })
    }

    /// Base URL requests are resolved against
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, NetworkError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| NetworkError::BadRequest {
                payload: format!("endpoint {} cannot carry request paths", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn transport_error(operation: &str, error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout {
            operation: operation.to_string(),
        }
    } else {
        NetworkError::unreachable(format!("{operation}: {error}"))
    }
}

async fn interpret<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<ApiResponse<T>, NetworkError> {
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(operation, e))?;
    let text = || String::from_utf8_lossy(&body).into_owned();

    let outcome = match status {
        200 | 201 => serde_json::from_slice(&body)
            .map(ApiResponse::Ok)
            .map_err(|e| NetworkError::UnexpectedResponse {
                status,
                payload: format!("undecodable body: {e}"),
            })?,
        204 => ApiResponse::NoContent,
        400 => ApiResponse::BadRequest(text()),
        403 => ApiResponse::Forbidden,
        _ => ApiResponse::Undocumented {
            status,
            payload: text(),
        },
    };
    tracing::debug!(operation, status, "Area responded");
    Ok(outcome)
}

#[async_trait]
impl AreaClient for HttpAreaClient {
    async fn get_entry_form_fields(
        &self,
        area: &AreaCode,
    ) -> Result<ApiResponse<EntryForm>, NetworkError> {
        const OPERATION: &str = "get_entry_form_fields";
        let url = self.url(&["areas", area.as_str(), "entry-form"])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;
        interpret(OPERATION, response).await
    }

    async fn submit_entry_form(
        &self,
        area: &AreaCode,
        submission: &EntrySubmission,
    ) -> Result<ApiResponse<EntryApplication>, NetworkError> {
        const OPERATION: &str = "submit_entry_form";
        let url = self.url(&["areas", area.as_str(), "entry-applications"])?;
        let response = self
            .http
            .post(url)
            .json(submission)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;
        interpret(OPERATION, response).await
    }

    async fn check_for_entry_verdict(
        &self,
        application_id: &str,
    ) -> Result<ApiResponse<EntryGrant>, NetworkError> {
        const OPERATION: &str = "check_for_entry_verdict";
        let url = self.url(&["entry-applications", application_id, "verdict"])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;
        interpret(OPERATION, response).await
    }

    async fn refresh_credentials(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<ApiResponse<CredentialGrant>, NetworkError> {
        const OPERATION: &str = "refresh_credentials";
        let url = self.url(&["sessions", "refresh"])?;
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose(),
            })
            .send()
            .await
            .map_err(|e| transport_error(OPERATION, e))?;
        interpret(OPERATION, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> HttpAreaClient {
        HttpAreaClient::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn request_paths_are_joined_and_escaped() {
        let client = client("https://area.example.net/api/");
        let url = client
            .url(&["areas", "north field", "entry-form"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://area.example.net/api/areas/north%20field/entry-form"
        );
    }

    #[test]
    fn rejects_unusable_endpoints() {
        assert!(HttpAreaClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpAreaClient::new("mailto:ops@example.net", Duration::from_secs(1)).is_err());
    }
}
