//! Subscription payment status and backend integration status.
//!
//! Both are state machines. Same-state moves are always allowed so that a
//! redelivered webhook can re-assert the status it already produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Payment lifecycle of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created at checkout submission, no gateway session yet.
    Pending,
    /// Gateway session created, waiting for the customer to pay.
    Processing,
    Active,
    Expired,
    Failed,
    Cancelled,
    Suspended,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 7] = [
        SubscriptionStatus::Pending,
        SubscriptionStatus::Processing,
        SubscriptionStatus::Active,
        SubscriptionStatus::Expired,
        SubscriptionStatus::Failed,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Suspended,
    ];

    /// Statuses that block a second purchase for the same email.
    pub const OPEN_PURCHASE: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Pending,
        SubscriptionStatus::Processing,
        SubscriptionStatus::Active,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Processing => "processing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Failed => "failed",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Suspended => "suspended",
        }
    }

    pub fn is_open_purchase(&self) -> bool {
        Self::OPEN_PURCHASE.contains(self)
    }

    /// Payment not yet settled either way.
    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, SubscriptionStatus::Pending | SubscriptionStatus::Processing)
    }

    /// Maps the gateway's recurring-subscription vocabulary.
    pub fn from_gateway_status(status: &str) -> Option<Self> {
        match status {
            "active" => Some(SubscriptionStatus::Active),
            "canceled" => Some(SubscriptionStatus::Cancelled),
            "past_due" => Some(SubscriptionStatus::Failed),
            "incomplete" => Some(SubscriptionStatus::Processing),
            _ => None,
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self == target || self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Processing, Active, Expired, Failed, Cancelled],
            Processing => vec![Active, Expired, Failed, Cancelled],
            Active => vec![Cancelled, Suspended],
            Suspended => vec![Active, Cancelled],
            Failed => vec![Active],
            Expired | Cancelled => vec![],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("subscription_status", format!("unknown '{}'", s))
            })
    }
}

/// Progress of provisioning the customer's organization in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    #[default]
    NotStarted,
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl IntegrationStatus {
    pub const ALL: [IntegrationStatus; 5] = [
        IntegrationStatus::NotStarted,
        IntegrationStatus::Pending,
        IntegrationStatus::Completed,
        IntegrationStatus::Failed,
        IntegrationStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::NotStarted => "not_started",
            IntegrationStatus::Pending => "pending",
            IntegrationStatus::Completed => "completed",
            IntegrationStatus::Failed => "failed",
            IntegrationStatus::Cancelled => "cancelled",
        }
    }

    /// True when a provisioning attempt should be scheduled.
    pub fn needs_provisioning(&self) -> bool {
        matches!(self, IntegrationStatus::NotStarted | IntegrationStatus::Failed)
    }
}

impl StateMachine for IntegrationStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self == target || self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use IntegrationStatus::*;
        match self {
            NotStarted => vec![Pending],
            Pending => vec![Completed, Failed],
            Failed => vec![Pending],
            Completed => vec![Cancelled],
            Cancelled => vec![],
        }
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("integration_status", format!("unknown '{}'", s))
            })
    }
}
