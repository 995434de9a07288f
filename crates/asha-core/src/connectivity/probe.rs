//! HTTP reachability probe feeding the connectivity monitor.

use std::time::Duration;

use crate::error::{Error, Result};

use super::{ConnectivityMonitor, ConnectivityStatus};

const PROBE_TIMEOUT_SECS: u64 = 5;

/// Periodically checks whether the backend is reachable and feeds the
/// observation into a [`ConnectivityMonitor`].
///
/// Any response counts as reachable as long as it is a success status; a
/// transport error or timeout counts as disconnected.
pub struct ConnectivityProbe {
    client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(url: impl Into<String>, interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .map_err(|error| Error::Network(error.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            interval,
        })
    }

    /// One-shot reachability check
    pub async fn check(&self) -> ConnectivityStatus {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => ConnectivityStatus::Connected,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "probe target unhealthy");
                ConnectivityStatus::Disconnected
            }
            Err(error) => {
                tracing::debug!(%error, "probe request failed");
                ConnectivityStatus::Disconnected
            }
        }
    }

    /// Probe forever at the configured interval, feeding the monitor.
    ///
    /// Runs until the owning task is dropped; callers typically `select!`
    /// this against a shutdown signal.
    pub async fn run(&self, monitor: &ConnectivityMonitor) {
        loop {
            monitor.set_status(self.check().await);
            tokio::time::sleep(self.interval).await;
        }
    }
}
