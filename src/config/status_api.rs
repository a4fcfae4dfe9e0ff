//! Status API (backend-facing subscription lookups) configuration

use secrecy::SecretString;
use serde::Deserialize;

use super::error::ValidationError;

const MIN_TOKEN_LEN: usize = 16;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusApiConfig {
    /// Bearer token the backend presents. The endpoint rejects every
    /// request when unset.
    pub api_token: Option<String>,
}

impl StatusApiConfig {
    pub fn token(&self) -> Option<SecretString> {
        self.api_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::new(t.clone()))
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        match self.api_token.as_deref() {
            Some(token) if !token.is_empty() && token.len() < MIN_TOKEN_LEN => {
                Err(ValidationError::StatusTokenTooShort)
            }
            None | Some("") if production => {
                Err(ValidationError::MissingRequired("status_api.api_token"))
            }
            _ => Ok(()),
        }
    }
}
