//! Payment configuration

use secrecy::SecretString;
use serde::Deserialize;

use super::error::ValidationError;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe API key
    pub stripe_api_key: String,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,

    /// Overrides the Stripe API origin (stripe-mock, tests)
    pub stripe_api_base: Option<String>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Redirect after payment. `{SUBSCRIPTION_ID}` is substituted; a relative
    /// path is resolved against `server.public_base_url`.
    #[serde(default = "default_success_url")]
    pub success_url: String,

    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,

    /// Reject test-mode events
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    pub fn api_key(&self) -> SecretString {
        SecretString::new(self.stripe_api_key.clone())
    }

    pub fn webhook_secret(&self) -> SecretString {
        SecretString::new(self.stripe_webhook_secret.clone())
    }

    /// Absolute success URL template.
    pub fn success_url_for(&self, public_base_url: &str) -> String {
        absolutize(public_base_url, &self.success_url)
    }

    pub fn cancel_url_for(&self, public_base_url: &str) -> String {
        absolutize(public_base_url, &self.cancel_url)
    }

    /// Validate payment configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("payment.stripe_api_key"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("payment.stripe_webhook_secret"));
        }

        // Verify key prefixes for safety
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ValidationError::InvalidCurrency(self.currency.clone()));
        }
        if let Some(base) = &self.stripe_api_base {
            super::check_url("payment.stripe_api_base", base, production)?;
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_api_base: None,
            currency: default_currency(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
            require_livemode: false,
        }
    }
}

fn absolutize(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    }
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_success_url() -> String {
    "/payment/success/{SUBSCRIPTION_ID}".to_string()
}

fn default_cancel_url() -> String {
    "/payment/cancel/{SUBSCRIPTION_ID}".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn valid() -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: "sk_test_xxx".to_string(),
            stripe_webhook_secret: "whsec_xxx".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_test_mode() {
        let config = valid();
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());
    }

    #[test]
    fn test_is_live_mode() {
        let config = PaymentConfig {
            stripe_api_key: "sk_live_xxx".to_string(),
            ..valid()
        };
        assert!(config.is_live_mode());
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_secrets_are_wrapped() {
        let config = valid();
        assert_eq!(config.webhook_secret().expose_secret(), "whsec_xxx");
        assert!(!format!("{:?}", config.api_key()).contains("sk_test_xxx"));
    }

    #[test]
    fn test_validation_missing_keys() {
        assert_eq!(
            PaymentConfig::default().validate(false),
            Err(ValidationError::MissingRequired("payment.stripe_api_key"))
        );
        let config = PaymentConfig {
            stripe_webhook_secret: String::new(),
            ..valid()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::MissingRequired("payment.stripe_webhook_secret"))
        );
    }

    #[test]
    fn test_validation_invalid_prefixes() {
        let bad_key = PaymentConfig {
            stripe_api_key: "pk_test_xxx".to_string(),
            ..valid()
        };
        assert_eq!(bad_key.validate(false), Err(ValidationError::InvalidStripeKey));

        let bad_secret = PaymentConfig {
            stripe_webhook_secret: "secret".to_string(),
            ..valid()
        };
        assert_eq!(
            bad_secret.validate(false),
            Err(ValidationError::InvalidStripeWebhookSecret)
        );
    }

    #[test]
    fn test_relative_redirects_use_public_origin() {
        let config = valid();
        assert_eq!(
            config.success_url_for("https://churchdirectory.app/"),
            "https://churchdirectory.app/payment/success/{SUBSCRIPTION_ID}"
        );
        let absolute = PaymentConfig {
            cancel_url: "https://other.example/cancel".to_string(),
            ..valid()
        };
        assert_eq!(
            absolute.cancel_url_for("https://churchdirectory.app"),
            "https://other.example/cancel"
        );
    }
}
