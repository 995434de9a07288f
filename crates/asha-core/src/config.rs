//! Remote endpoint configuration.
//!
//! The mapping from submission category to endpoint path is configuration,
//! not part of the sync contract: everything here is injectable so clients
//! and tests can point the engine at any backend.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::Category;
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_HEALTH_PATH: &str = "/submit";
const DEFAULT_WATER_PATH: &str = "/water/submit";
const DEFAULT_PROBE_PATH: &str = "/healthz";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Where submissions go: a base URL plus one path per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    base_url: String,
    health_path: String,
    water_path: String,
    probe_path: String,
    request_timeout: Duration,
}

impl RemoteConfig {
    /// Create a configuration for the given base URL with default paths.
    ///
    /// The URL must include an `http://` or `https://` scheme; a trailing
    /// slash is trimmed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            water_path: DEFAULT_WATER_PATH.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Override the health submission path.
    #[must_use]
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = normalize_path(path.into());
        self
    }

    /// Override the water submission path.
    #[must_use]
    pub fn with_water_path(mut self, path: impl Into<String>) -> Self {
        self.water_path = normalize_path(path.into());
        self
    }

    /// Override the connectivity probe path.
    #[must_use]
    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = normalize_path(path.into());
        self
    }

    /// Override the per-request send timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bounded timeout applied to every send attempt.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Full URL for the given submission category.
    #[must_use]
    pub fn endpoint_for(&self, category: Category) -> String {
        let path = match category {
            Category::Health => &self.health_path,
            Category::Water => &self.water_path,
        };
        format!("{}{path}", self.base_url)
    }

    /// Full URL of the reachability probe target.
    #[must_use]
    pub fn probe_url(&self) -> String {
        format!("{}{}", self.base_url, self.probe_path)
    }

    /// Load configuration from `ASHA_REMOTE_URL` and optional overrides
    /// (`ASHA_HEALTH_PATH`, `ASHA_WATER_PATH`, `ASHA_PROBE_PATH`,
    /// `ASHA_REQUEST_TIMEOUT_SECS`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Self::from_env`], reading variables through the given
    /// lookup so callers can pin the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = normalize_text_option(lookup("ASHA_REMOTE_URL")).ok_or_else(|| {
            Error::InvalidInput("ASHA_REMOTE_URL must be set to the backend base URL".to_string())
        })?;

        let mut config = Self::new(base_url)?;
        if let Some(path) = normalize_text_option(lookup("ASHA_HEALTH_PATH")) {
            config = config.with_health_path(path);
        }
        if let Some(path) = normalize_text_option(lookup("ASHA_WATER_PATH")) {
            config = config.with_water_path(path);
        }
        if let Some(path) = normalize_text_option(lookup("ASHA_PROBE_PATH")) {
            config = config.with_probe_path(path);
        }
        if let Some(raw) = normalize_text_option(lookup("ASHA_REQUEST_TIMEOUT_SECS")) {
            let secs = raw.parse::<u64>().map_err(|_| {
                Error::InvalidInput(
                    "ASHA_REQUEST_TIMEOUT_SECS must be a positive integer".to_string(),
                )
            })?;
            if secs == 0 {
                return Err(Error::InvalidInput(
                    "ASHA_REQUEST_TIMEOUT_SECS must be a positive integer".to_string(),
                ));
            }
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}

fn normalize_path(path: String) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn endpoint_for_routes_per_category() {
        let config = RemoteConfig::new("https://api.example.com/").unwrap();
        assert_eq!(
            config.endpoint_for(Category::Health),
            "https://api.example.com/submit"
        );
        assert_eq!(
            config.endpoint_for(Category::Water),
            "https://api.example.com/water/submit"
        );
        assert_eq!(config.probe_url(), "https://api.example.com/healthz");
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(RemoteConfig::new("").is_err());
        assert!(RemoteConfig::new("api.example.com").is_err());
        assert!(RemoteConfig::new("ftp://api.example.com").is_err());
    }

    #[test]
    fn path_overrides_gain_leading_slash() {
        let config = RemoteConfig::new("http://localhost:8080")
            .unwrap()
            .with_health_path("v2/health")
            .with_water_path("/v2/water");
        assert_eq!(
            config.endpoint_for(Category::Health),
            "http://localhost:8080/v2/health"
        );
        assert_eq!(
            config.endpoint_for(Category::Water),
            "http://localhost:8080/v2/water"
        );
    }

    #[test]
    fn from_lookup_requires_base_url() {
        let error = RemoteConfig::from_lookup(|_| None).unwrap_err();
        assert!(error.to_string().contains("ASHA_REMOTE_URL"));
    }

    #[test]
    fn from_lookup_applies_overrides() {
        let config = RemoteConfig::from_lookup(|name| match name {
            "ASHA_REMOTE_URL" => Some("https://api.example.com".to_string()),
            "ASHA_WATER_PATH" => Some("/samples/water".to_string()),
            "ASHA_REQUEST_TIMEOUT_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(
            config.endpoint_for(Category::Water),
            "https://api.example.com/samples/water"
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn from_lookup_rejects_zero_timeout() {
        let error = RemoteConfig::from_lookup(|name| match name {
            "ASHA_REMOTE_URL" => Some("https://api.example.com".to_string()),
            "ASHA_REQUEST_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(error.to_string().contains("ASHA_REQUEST_TIMEOUT_SECS"));
    }
}
