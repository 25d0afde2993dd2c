//! Round-trips to remote license servers.
//!
//! Validation is `POST <endpoint>` with the form body `license=<key>&url=<origin>`;
//! a 2xx answer means the key is good. Any other status carries a JSON body
//! whose `message` field explains the rejection.
//!
//! Unlinking is `DELETE <endpoint>?license=<key>&url=<origin>`. Any response
//! at all counts as success; only transport failures are errors.

use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A rejection or transport failure reported by a license server call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    /// HTTP status, or `None` if no response arrived.
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("license server timed out: {err}")
        } else {
            format!("license server unreachable: {err}")
        };
        Self {
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

/// Client side of the license server protocol.
#[async_trait]
pub trait LicenseValidator: Send + Sync {
    /// Asks the server at `endpoint` whether `key` is valid for `origin`.
    async fn validate(&self, endpoint: &str, key: &str, origin: &str) -> Result<(), RemoteError>;

    /// Releases `key` from `origin` at the server.
    async fn unlink(&self, endpoint: &str, key: &str, origin: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`LicenseValidator`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLicenseValidator {
    client: Client,
}

impl HttpLicenseValidator {
    /// Creates a validator whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> LicenseResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LicenseError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LicenseValidator for HttpLicenseValidator {
    async fn validate(&self, endpoint: &str, key: &str, origin: &str) -> Result<(), RemoteError> {
        debug!(endpoint, "POST license validation");
        let response = self
            .client
            .post(endpoint)
            .form(&[("license", key), ("url", origin)])
            .send()
            .await
            .map_err(RemoteError::transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(
            Some(status.as_u16()),
            rejection_message(status, &body),
        ))
    }

    async fn unlink(&self, endpoint: &str, key: &str, origin: &str) -> Result<(), RemoteError> {
        debug!(endpoint, "DELETE license link");
        self.client
            .delete(endpoint)
            .query(&[("license", key), ("url", origin)])
            .send()
            .await
            .map_err(RemoteError::transport)?;
        Ok(())
    }
}

/// The server's `message`, else the raw body, else the status reason.
fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Some(message) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
    {
        return message;
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.chars().take(200).collect();
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
