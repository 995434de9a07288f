//! HTTP client for the per-category submission endpoints.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::Submission;
use crate::util::compact_text;

/// Header carrying the locally generated submission id, so the remote can
/// deduplicate resends after a lost acknowledgment.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Sends one submission at a time to the endpoint its category routes to.
#[derive(Clone)]
pub struct RemoteClient {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| Error::Network(error.to_string()))?;
        Ok(Self { config, client })
    }

    /// Attempt one network send. A success status with a JSON
    /// acknowledgment body counts as confirmation; everything else is an
    /// error the caller records as a failed attempt.
    pub async fn send(&self, submission: &Submission) -> Result<()> {
        let endpoint = self.config.endpoint_for(submission.category);

        let response = self
            .client
            .post(&endpoint)
            .header(IDEMPOTENCY_KEY_HEADER, submission.id.as_str())
            .header("Accept", "application/json")
            .json(&submission.payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteRejected {
                status: status.as_u16(),
                message: parse_rejection_message(status, &body),
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|error| Error::RemoteRejected {
                status: status.as_u16(),
                message: format!("invalid acknowledgment body: {error}"),
            })?;

        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Network(format!("request timed out: {error}"))
    } else {
        Error::Network(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RejectionBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}
