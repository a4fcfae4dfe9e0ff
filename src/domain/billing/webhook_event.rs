//! Webhook event log entries and reconciliation outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{SubscriptionId, Timestamp};

/// One row of the append-only inbound event log, keyed by Stripe's event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub outcome: Option<String>,
    pub subscription_id: Option<SubscriptionId>,
    /// Set while a worker holds the processing lease.
    pub claimed_at: Option<Timestamp>,
    pub attempts: u32,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

impl WebhookEventRecord {
    pub fn received(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        now: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            processed: false,
            processing_error: None,
            outcome: None,
            subscription_id: None,
            claimed_at: None,
            attempts: 0,
            received_at: now,
            processed_at: None,
        }
    }
}

/// What a handler did with an event. Stored on the event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Activated,
    Renewed,
    Expired,
    Failed,
    Cancelled,
    StatusSynced,
    /// Event understood but nothing to change (duplicate, stale, wrong state).
    Skipped { reason: String },
    /// No local subscription matched.
    NotFound,
    /// Event type has no handler.
    Unhandled,
}

impl ReconcileOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        ReconcileOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Activated => "activated",
            ReconcileOutcome::Renewed => "renewed",
            ReconcileOutcome::Expired => "expired",
            ReconcileOutcome::Failed => "failed",
            ReconcileOutcome::Cancelled => "cancelled",
            ReconcileOutcome::StatusSynced => "status_synced",
            ReconcileOutcome::Skipped { .. } => "skipped",
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::Unhandled => "unhandled",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}
