//! ProcessWebhookHandler - verified, exactly-once intake of Stripe events.
//!
//! Order of operations:
//!
//! 1. Verify the signature and parse the envelope. Failures are final (4xx).
//! 2. Claim the event id in the event log. A processed or in-flight event is
//!    acknowledged without running any handler.
//! 3. Reconcile, then record the outcome. A failed reconcile is recorded and
//!    surfaced as a 5xx so Stripe redelivers it.

use std::sync::Arc;
use std::time::Duration;

use super::reconciler::EventReconciler;
use crate::domain::billing::{
    ReconcileOutcome, StripeWebhookVerifier, WebhookError, WebhookEventRecord,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{ClaimOutcome, WebhookEventRepository, DEFAULT_CLAIM_LEASE};

#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header value.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessWebhookResult {
    Processed {
        event_id: String,
        outcome: ReconcileOutcome,
    },
    /// Already handled by an earlier delivery.
    Duplicate { event_id: String },
    /// Another delivery holds the processing lease.
    InFlight { event_id: String },
}

impl ProcessWebhookResult {
    pub fn event_id(&self) -> &str {
        match self {
            ProcessWebhookResult::Processed { event_id, .. }
            | ProcessWebhookResult::Duplicate { event_id }
            | ProcessWebhookResult::InFlight { event_id } => event_id,
        }
    }
}

pub struct ProcessWebhookHandler {
    verifier: StripeWebhookVerifier,
    events: Arc<dyn WebhookEventRepository>,
    reconciler: EventReconciler,
    lease: Duration,
}

impl ProcessWebhookHandler {
    pub fn new(
        verifier: StripeWebhookVerifier,
        events: Arc<dyn WebhookEventRepository>,
        reconciler: EventReconciler,
    ) -> Self {
        Self {
            verifier,
            events,
            reconciler,
            lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        let event = self.verifier.verify_and_parse(&cmd.payload, &cmd.signature)?;
        let payload: serde_json::Value = serde_json::from_slice(&cmd.payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let record =
            WebhookEventRecord::received(&event.id, &event.event_type, payload, Timestamp::now());

        match self.events.claim(&record, self.lease).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => {
                tracing::info!(event_id = %event.id, "Duplicate webhook event");
                return Ok(ProcessWebhookResult::Duplicate { event_id: event.id });
            }
            ClaimOutcome::InFlight => {
                tracing::info!(event_id = %event.id, "Webhook event already being processed");
                return Ok(ProcessWebhookResult::InFlight { event_id: event.id });
            }
        }

        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing webhook event");

        match self.reconciler.reconcile(&event).await {
            Ok(reconciled) => {
                self.events
                    .mark_processed(&event.id, reconciled.subscription_id, &reconciled.outcome)
                    .await?;
                Ok(ProcessWebhookResult::Processed {
                    event_id: event.id,
                    outcome: reconciled.outcome,
                })
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook reconciliation failed"
                );
                if let Err(log_err) = self.events.mark_failed(&event.id, &e.to_string()).await {
                    tracing::error!(event_id = %event.id, error = %log_err, "Failed to record webhook failure");
                }
                Err(e)
            }
        }
    }
}
