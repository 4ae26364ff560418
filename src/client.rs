//! HTTP client for the WOW ingestion endpoint.
//!
//! One call, one request. The client never retries; the coordinator's
//! schedule is the only retry policy. Every response or transport failure is
//! classified into an [`UploadOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Credentials, UploadOutcome};
use crate::payload::{self, QueryParams};

pub const DEFAULT_ENDPOINT: &str = "http://wow.metoffice.gov.uk/automaticreading";

/// Longest response body excerpt kept in an outcome message.
const MAX_BODY_EXCERPT: usize = 200;

// ---

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Something that can deliver a parameter set to the remote service.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, params: &[(&'static str, String)]) -> UploadOutcome;
}

#[derive(Debug, Clone)]
pub struct WowClient {
    endpoint: String,
    timeout: Duration,
    client: Client,
}

impl WowClient {
    // ---
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        // ---
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            timeout,
            client,
        })
    }

    /// Send one `GET` with `params` as the query string and classify the result.
    pub async fn send(&self, params: &[(&'static str, String)]) -> UploadOutcome {
        // ---
        debug!("Sending {} parameters to {}", params.len(), self.endpoint);

        let response = match self.client.get(&self.endpoint).query(params).send().await {
            Ok(response) => response,
            Err(e) => return self.transport_failure(e),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return self.transport_failure(e),
        };
        debug!("WOW responded {} ({} bytes)", status, body.len());

        classify(status, &body)
    }

    /// Send only the required fields with a `-test` client identifier.
    ///
    /// Used to validate credentials without submitting observations.
    pub async fn verify_credentials(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> UploadOutcome {
        // ---
        let software_type = format!("{}-test", payload::SOFTWARE_TYPE);
        let params: QueryParams = payload::required_params(credentials, now, &software_type);
        self.send(&params).await
    }

    fn transport_failure(&self, e: reqwest::Error) -> UploadOutcome {
        // ---
        let message = if e.is_timeout() {
            format!("Request timed out after {:?}", self.timeout)
        } else if e.is_connect() {
            format!("Connection error: {e}")
        } else {
            format!("Request failed: {e}")
        };
        warn!("Upload transport failure: {}", message);
        UploadOutcome::NetworkError { message }
    }
}

#[async_trait]
impl Uploader for WowClient {
    async fn upload(&self, params: &[(&'static str, String)]) -> UploadOutcome {
        self.send(params).await
    }
}

// ---

/// Map an HTTP status and body onto an [`UploadOutcome`].
pub fn classify(status: StatusCode, body: &str) -> UploadOutcome {
    // ---
    let lower = body.to_lowercase();
    let message = || format!("HTTP {}: {}", status.as_u16(), excerpt(body));

    match status {
        StatusCode::TOO_MANY_REQUESTS => UploadOutcome::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            UploadOutcome::AuthError { message: message() }
        }
        _ if reports_invalid_credentials(&lower) => UploadOutcome::AuthError { message: message() },
        StatusCode::OK if !lower.contains("error") => UploadOutcome::Success,
        _ => UploadOutcome::Rejected {
            status: status.as_u16(),
            message: excerpt(body),
        },
    }
}

fn reports_invalid_credentials(lower_body: &str) -> bool {
    lower_body.contains("unauthori")
        || (lower_body.contains("invalid")
            && ["key", "site", "auth"].iter().any(|w| lower_body.contains(w)))
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_BODY_EXCERPT {
        let cut: String = trimmed.chars().take(MAX_BODY_EXCERPT).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
