//! Church directory backend (provisioning API) configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// API root, e.g. `https://api.churchdirectory.app/`. Provisioning is
    /// disabled when unset.
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Schedule provisioning after activation
    #[serde(default = "default_integration_enabled")]
    pub integration_enabled: bool,
}

impl BackendConfig {
    /// Base URL when provisioning can actually reach a backend.
    pub fn endpoint(&self) -> Option<&str> {
        self.base_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn api_key(&self) -> SecretString {
        SecretString::new(self.api_key.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Integration is effective only with a configured endpoint.
    pub fn integration_active(&self) -> bool {
        self.integration_enabled && self.endpoint().is_some()
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ValidationError::InvalidBackendTimeout);
        }
        if let Some(url) = self.endpoint() {
            super::check_url("backend.base_url", url, production)?;
            if self.api_key.is_empty() {
                return Err(ValidationError::MissingRequired("backend.api_key"));
            }
        }
        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: String::new(),
            timeout_secs: default_timeout(),
            integration_enabled: default_integration_enabled(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_integration_enabled() -> bool {
    true
}
