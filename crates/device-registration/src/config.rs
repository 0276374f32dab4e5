//! Client configuration

use crate::error::{RegistrationError, Result};
use crate::wire::{REQUEST_ID_PATH, SERIAL_PATH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registration client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RegistrationConfig {
    /// Base URL of the device service
    pub base_url: String,
    pub request_id_path: String,
    pub serial_path: String,
    /// Stable client identifier sent with every request
    pub user_agent: String,
    /// Probe the service with `HEAD /` before asking for a request id
    pub probe: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Pre-assigned serial to offer (authority assigns one otherwise)
    pub proposed_serial: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            request_id_path: REQUEST_ID_PATH.into(),
            serial_path: SERIAL_PATH.into(),
            user_agent: format!("device-registration/{}", crate::VERSION),
            probe: false,
            timeout_secs: 30,
            proposed_serial: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl RegistrationConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RegistrationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RegistrationError::Config(format!(
                "base-url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(RegistrationError::Config(
                "retry.max-attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn request_id_url(&self) -> String {
        self.url(&self.request_id_path)
    }

    pub fn serial_url(&self) -> String {
        self.url(&self.serial_path)
    }

    pub fn probe_url(&self) -> String {
        self.url("/")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Backoff schedule for `202 Pending` answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Total submissions allowed, the first one included
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Wait before submission `attempt + 1`, doubling from the initial backoff
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}
