//! Local shadow of a gateway checkout session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Money, SubscriptionId, Timestamp, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutSessionStatus {
    Open,
    Completed,
    Expired,
    Failed,
    Cancelled,
}

impl CheckoutSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutSessionStatus::Open => "open",
            CheckoutSessionStatus::Completed => "completed",
            CheckoutSessionStatus::Expired => "expired",
            CheckoutSessionStatus::Failed => "failed",
            CheckoutSessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CheckoutSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckoutSessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CheckoutSessionStatus::Open),
            "completed" => Ok(CheckoutSessionStatus::Completed),
            "expired" => Ok(CheckoutSessionStatus::Expired),
            "failed" => Ok(CheckoutSessionStatus::Failed),
            "cancelled" => Ok(CheckoutSessionStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "checkout_session_status",
                format!("unknown '{}'", other),
            )),
        }
    }
}

/// Tracks gateway-side session state so redeliveries and expirations can be
/// reconciled without calling the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionRecord {
    /// Gateway session id (`cs_...`).
    pub session_id: String,
    pub subscription_id: SubscriptionId,
    pub payment_intent_id: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub status: CheckoutSessionStatus,
    pub checkout_url: Option<String>,
    /// Gateway-reported error, e.g. `last_payment_error`.
    pub last_error: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CheckoutSessionRecord {
    pub fn open(
        session_id: impl Into<String>,
        subscription_id: SubscriptionId,
        amount: Money,
        currency: impl Into<String>,
        checkout_url: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            subscription_id,
            payment_intent_id: None,
            amount,
            currency: currency.into(),
            status: CheckoutSessionStatus::Open,
            checkout_url,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves out of `open`. A session that already reached a final status
    /// keeps it, except that a late success always wins.
    pub fn settle(&mut self, status: CheckoutSessionStatus, now: Timestamp) -> bool {
        let allowed = self.status == CheckoutSessionStatus::Open
            || (status == CheckoutSessionStatus::Completed
                && self.status != CheckoutSessionStatus::Completed);
        if allowed && self.status != status {
            self.status = status;
            self.updated_at = now;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CheckoutSessionRecord {
        CheckoutSessionRecord::open(
            "cs_test_1",
            SubscriptionId::new(),
            Money::from_cents(2_000),
            "usd",
            Some("https://checkout.stripe.com/c/pay/cs_test_1".into()),
            Timestamp::now(),
        )
    }

    #[test]
    fn open_session_can_settle_once() {
        let mut r = record();
        assert!(r.settle(CheckoutSessionStatus::Expired, Timestamp::now()));
        assert!(!r.settle(CheckoutSessionStatus::Cancelled, Timestamp::now()));
        assert_eq!(r.status, CheckoutSessionStatus::Expired);
    }

    #[test]
    fn late_completion_overrides_failure() {
        let mut r = record();
        r.settle(CheckoutSessionStatus::Failed, Timestamp::now());
        assert!(r.settle(CheckoutSessionStatus::Completed, Timestamp::now()));
        assert!(!r.settle(CheckoutSessionStatus::Completed, Timestamp::now()));
    }

    #[test]
    fn status_parses_from_storage_string() {
        assert_eq!("expired".parse(), Ok(CheckoutSessionStatus::Expired));
        assert!("paid".parse::<CheckoutSessionStatus>().is_err());
    }
}
