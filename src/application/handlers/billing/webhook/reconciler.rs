//! Per-event-type reconciliation of Stripe events into subscription state.
//!
//! Every handler is idempotent: it checks whether the target state was
//! already reached, runs the transition through the state machine, and
//! reports a rejected or redundant change as `Skipped` rather than failing.
//! Follow-up provisioning work is scheduled only after the subscription was
//! saved.

use std::sync::Arc;

use crate::application::handlers::billing::coupon_release::release_owed_coupon;
use crate::application::handlers::versioned_update::{modify_subscription, Change};
use crate::domain::billing::{
    CheckoutSessionObject, CheckoutSessionStatus, InvoiceObject, PaymentIntentObject,
    ReconcileOutcome, StripeEvent, StripeEventType, Subscription, SubscriptionObject,
    SubscriptionStatus, Transition, WebhookError,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    CheckoutSessionRepository, CouponRepository, ProvisioningTask, SubscriptionLookup,
    SubscriptionRepository, TaskDispatcher,
};

/// What reconciling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: ReconcileOutcome,
    pub subscription_id: Option<SubscriptionId>,
}

impl Reconciled {
    fn unmatched(outcome: ReconcileOutcome) -> Self {
        Self {
            outcome,
            subscription_id: None,
        }
    }
}

/// Decision taken inside the read-modify-write closure.
enum Step {
    Skip(String),
    Applied {
        outcome: ReconcileOutcome,
        task: Option<ProvisioningTask>,
    },
}

impl Step {
    fn skip(reason: impl Into<String>) -> Change<Step> {
        Change::Keep(Step::Skip(reason.into()))
    }

    fn rejected(transition: Transition) -> Change<Step> {
        match transition {
            Transition::Rejected { from, to } => {
                Step::skip(format!("transition {} -> {} not allowed", from, to))
            }
            _ => Step::skip("status unchanged"),
        }
    }
}

/// Task to push a status change to an organization that already exists.
fn sync_if_provisioned(sub: &Subscription) -> Option<ProvisioningTask> {
    sub.is_provisioned().then_some(ProvisioningTask::SyncStatus(sub.id))
}

pub struct EventReconciler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    sessions: Arc<dyn CheckoutSessionRepository>,
    coupons: Arc<dyn CouponRepository>,
    dispatcher: Arc<dyn TaskDispatcher>,
    integration_enabled: bool,
}

impl EventReconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        sessions: Arc<dyn CheckoutSessionRepository>,
        coupons: Arc<dyn CouponRepository>,
        dispatcher: Arc<dyn TaskDispatcher>,
        integration_enabled: bool,
    ) -> Self {
        Self {
            subscriptions,
            sessions,
            coupons,
            dispatcher,
            integration_enabled,
        }
    }

    pub async fn reconcile(&self, event: &StripeEvent) -> Result<Reconciled, WebhookError> {
        match event.parsed_type() {
            StripeEventType::CheckoutSessionCompleted => {
                self.checkout_completed(object(event)?).await
            }
            StripeEventType::CheckoutSessionExpired => self.checkout_expired(object(event)?).await,
            StripeEventType::PaymentIntentSucceeded => {
                self.payment_succeeded(object(event)?).await
            }
            StripeEventType::PaymentIntentFailed => self.payment_failed(object(event)?).await,
            StripeEventType::InvoicePaid => self.invoice_paid(object(event)?).await,
            StripeEventType::InvoicePaymentFailed => {
                self.invoice_payment_failed(object(event)?).await
            }
            StripeEventType::CustomerSubscriptionUpdated => {
                self.subscription_updated(object(event)?).await
            }
            StripeEventType::CustomerSubscriptionDeleted => {
                self.subscription_deleted(object(event)?).await
            }
            StripeEventType::Unknown => {
                tracing::debug!(event_type = %event.event_type, "No handler for event type");
                Ok(Reconciled::unmatched(ReconcileOutcome::Unhandled))
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Checkout sessions
    // ════════════════════════════════════════════════════════════════════════════

    async fn checkout_completed(&self, session: CheckoutSessionObject) -> Result<Reconciled, WebhookError> {
        let lookup = match session.subscription_id() {
            Some(id) => SubscriptionLookup::Id(id),
            None => SubscriptionLookup::CheckoutSession(session.id.clone()),
        };
        let now = Timestamp::now();
        let provision = self.integration_enabled;

        let result = self
            .apply(&lookup, |sub| {
                if sub.is_activated() {
                    return Step::skip("already active");
                }
                let transition = sub.activate(now);
                if transition.is_rejected() {
                    tracing::error!(
                        subscription_id = %sub.id,
                        status = %sub.status,
                        session_id = %session.id,
                        payment_intent = ?session.payment_intent,
                        "Checkout paid for a purchase that already ended; needs manual review"
                    );
                    return Step::rejected(transition);
                }
                sub.record_gateway_ids(
                    session.customer.as_deref(),
                    session.payment_intent.as_deref(),
                    session.subscription.as_deref(),
                );
                if sub.checkout_session_id.is_none() {
                    sub.checkout_session_id = Some(session.id.clone());
                }
                let task = (provision && sub.begin_provisioning(now))
                    .then_some(ProvisioningTask::CreateOrganization(sub.id));
                Change::Save(Step::Applied {
                    outcome: ReconcileOutcome::Activated,
                    task,
                })
            })
            .await?;

        if let Some(id) = result.subscription_id {
            if result.outcome == ReconcileOutcome::Activated {
                self.settle_session(
                    Some(&session.id),
                    None,
                    id,
                    CheckoutSessionStatus::Completed,
                    session.payment_intent.as_deref(),
                    None,
                )
                .await?;
            }
        }
        Ok(result)
    }

    async fn checkout_expired(&self, session: CheckoutSessionObject) -> Result<Reconciled, WebhookError> {
        let lookup = match session.subscription_id() {
            Some(id) => SubscriptionLookup::Id(id),
            None => SubscriptionLookup::CheckoutSession(session.id.clone()),
        };
        let now = Timestamp::now();

        let result = self
            .apply(&lookup, |sub| {
                if !sub.status.is_awaiting_payment() {
                    return Step::skip(format!("subscription is {}", sub.status));
                }
                let transition = sub.transition_to(SubscriptionStatus::Expired, now);
                if !transition.is_applied() {
                    return Step::rejected(transition);
                }
                sub.failure_reason = Some("Checkout session expired".into());
                Change::Save(Step::Applied {
                    outcome: ReconcileOutcome::Expired,
                    task: None,
                })
            })
            .await?;

        if let Some(id) = result.subscription_id {
            // Also runs on redelivery, finishing a release an earlier attempt
            // could not complete.
            release_owed_coupon(self.subscriptions.as_ref(), self.coupons.as_ref(), id).await?;
            self.settle_session(
                Some(&session.id),
                None,
                id,
                CheckoutSessionStatus::Expired,
                None,
                None,
            )
            .await?;
        }
        Ok(result)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment intents
    // ════════════════════════════════════════════════════════════════════════════

    async fn payment_succeeded(&self, intent: PaymentIntentObject) -> Result<Reconciled, WebhookError> {
        let lookup = match intent.subscription_id() {
            Some(id) => SubscriptionLookup::Id(id),
            None => SubscriptionLookup::PaymentIntent(intent.id.clone()),
        };
        let now = Timestamp::now();
        let provision = self.integration_enabled;

        let result = self
            .apply(&lookup, |sub| {
                if sub.is_activated() {
                    return Step::skip("already active");
                }
                if !(sub.status.is_awaiting_payment() || sub.status == SubscriptionStatus::Failed) {
                    tracing::warn!(
                        subscription_id = %sub.id,
                        status = %sub.status,
                        payment_intent = %intent.id,
                        "Payment succeeded for subscription in unexpected state"
                    );
                    return Step::skip(format!("unexpected state {}", sub.status));
                }
                let transition = sub.activate(now);
                if transition.is_rejected() {
                    return Step::rejected(transition);
                }
                sub.record_gateway_ids(intent.customer.as_deref(), Some(&intent.id), None);
                let task = (provision && sub.begin_provisioning(now))
                    .then_some(ProvisioningTask::CreateOrganization(sub.id));
                Change::Save(Step::Applied {
                    outcome: ReconcileOutcome::Activated,
                    task,
                })
            })
            .await?;

        if let Some(id) = result.subscription_id {
            if result.outcome == ReconcileOutcome::Activated {
                self.settle_session(
                    None,
                    Some(&intent.id),
                    id,
                    CheckoutSessionStatus::Completed,
                    Some(&intent.id),
                    None,
                )
                .await?;
            }
        }
        Ok(result)
    }

    async fn payment_failed(&self, intent: PaymentIntentObject) -> Result<Reconciled, WebhookError> {
        let lookup = match intent.subscription_id() {
            Some(id) => SubscriptionLookup::Id(id),
            None => SubscriptionLookup::PaymentIntent(intent.id.clone()),
        };
        let reason = intent.failure_message();
        let now = Timestamp::now();

        let result = self
            .apply(&lookup, |sub| {
                let transition = sub.mark_failed(reason.clone(), now);
                if !transition.is_applied() {
                    return Step::rejected(transition);
                }
                sub.record_gateway_ids(intent.customer.as_deref(), Some(&intent.id), None);
                Change::Save(Step::Applied {
                    outcome: ReconcileOutcome::Failed,
                    task: sync_if_provisioned(sub),
                })
            })
            .await?;

        if let Some(id) = result.subscription_id {
            self.settle_session(
                None,
                Some(&intent.id),
                id,
                CheckoutSessionStatus::Failed,
                Some(&intent.id),
                intent.last_payment_error.clone(),
            )
            .await?;
        }
        Ok(result)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Recurring billing
    // ════════════════════════════════════════════════════════════════════════════

    async fn invoice_paid(&self, invoice: InvoiceObject) -> Result<Reconciled, WebhookError> {
        let Some(gateway_id) = invoice.subscription.clone() else {
            return Ok(Reconciled::unmatched(ReconcileOutcome::skipped(
                "invoice has no subscription",
            )));
        };
        let now = Timestamp::now();

        self.apply(&SubscriptionLookup::GatewaySubscription(gateway_id), |sub| {
            // invoice.paid and invoice.payment_succeeded both arrive for one invoice.
            if sub.last_invoice_id.as_deref() == Some(invoice.id.as_str()) {
                return Step::skip("invoice already applied");
            }
            let was = sub.status;
            let transition = sub.renew(now);
            if transition.is_rejected() {
                return Step::rejected(transition);
            }
            sub.last_invoice_id = Some(invoice.id.clone());
            let task = if was != SubscriptionStatus::Active {
                sync_if_provisioned(sub)
            } else {
                None
            };
            Change::Save(Step::Applied {
                outcome: ReconcileOutcome::Renewed,
                task,
            })
        })
        .await
    }

    async fn invoice_payment_failed(&self, invoice: InvoiceObject) -> Result<Reconciled, WebhookError> {
        let Some(gateway_id) = invoice.subscription.clone() else {
            return Ok(Reconciled::unmatched(ReconcileOutcome::skipped(
                "invoice has no subscription",
            )));
        };
        let now = Timestamp::now();

        self.apply(&SubscriptionLookup::GatewaySubscription(gateway_id), |sub| {
            let transition = sub.mark_failed(format!("Invoice {} payment failed", invoice.id), now);
            if !transition.is_applied() {
                return Step::rejected(transition);
            }
            Change::Save(Step::Applied {
                outcome: ReconcileOutcome::Failed,
                task: sync_if_provisioned(sub),
            })
        })
        .await
    }

    async fn subscription_updated(&self, object: SubscriptionObject) -> Result<Reconciled, WebhookError> {
        let Some(target) = SubscriptionStatus::from_gateway_status(&object.status) else {
            tracing::info!(gateway_status = %object.status, "Ignoring unmapped gateway status");
            return Ok(Reconciled::unmatched(ReconcileOutcome::skipped(format!(
                "unmapped gateway status {}",
                object.status
            ))));
        };
        let now = Timestamp::now();

        self.apply(&SubscriptionLookup::GatewaySubscription(object.id.clone()), |sub| {
            let transition = if target == SubscriptionStatus::Cancelled {
                sub.cancel(now)
            } else {
                sub.transition_to(target, now)
            };
            if !transition.is_applied() {
                return Step::rejected(transition);
            }
            let task = if target == SubscriptionStatus::Cancelled {
                Some(ProvisioningTask::CancelOrganization(sub.id))
            } else {
                sync_if_provisioned(sub)
            };
            Change::Save(Step::Applied {
                outcome: ReconcileOutcome::StatusSynced,
                task,
            })
        })
        .await
    }

    async fn subscription_deleted(&self, object: SubscriptionObject) -> Result<Reconciled, WebhookError> {
        let now = Timestamp::now();

        self.apply(&SubscriptionLookup::GatewaySubscription(object.id.clone()), |sub| {
            let transition = sub.cancel(now);
            if !transition.is_applied() {
                return Step::rejected(transition);
            }
            Change::Save(Step::Applied {
                outcome: ReconcileOutcome::Cancelled,
                task: Some(ProvisioningTask::CancelOrganization(sub.id)),
            })
        })
        .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Shared steps
    // ════════════════════════════════════════════════════════════════════════════

    /// Runs `decide` under optimistic concurrency, then schedules whatever
    /// task it asked for.
    async fn apply<F>(&self, lookup: &SubscriptionLookup, decide: F) -> Result<Reconciled, WebhookError>
    where
        F: FnMut(&mut Subscription) -> Change<Step>,
    {
        let Some((sub, step)) =
            modify_subscription(self.subscriptions.as_ref(), lookup, decide).await?
        else {
            tracing::warn!(?lookup, "No subscription matches event");
            return Ok(Reconciled::unmatched(ReconcileOutcome::NotFound));
        };

        let outcome = match step {
            Step::Skip(reason) => {
                tracing::info!(subscription_id = %sub.id, status = %sub.status, reason = %reason, "Event skipped");
                ReconcileOutcome::skipped(reason)
            }
            Step::Applied { outcome, task } => {
                tracing::info!(subscription_id = %sub.id, status = %sub.status, outcome = %outcome, "Subscription reconciled");
                if let Some(task) = task {
                    self.schedule(task).await;
                }
                outcome
            }
        };
        Ok(Reconciled {
            outcome,
            subscription_id: Some(sub.id),
        })
    }

    async fn schedule(&self, task: ProvisioningTask) {
        if !self.integration_enabled {
            tracing::debug!(%task, "Backend integration disabled; task not scheduled");
            return;
        }
        if let Err(e) = self.dispatcher.dispatch(task).await {
            tracing::warn!(%task, error = %e, "Provisioning task not scheduled; left for bulk retry");
        }
    }

    /// Moves the local session shadow. Looks it up by session id, then by
    /// payment intent, then falls back to the newest one for the subscription.
    async fn settle_session(
        &self,
        session_id: Option<&str>,
        payment_intent_id: Option<&str>,
        subscription_id: SubscriptionId,
        status: CheckoutSessionStatus,
        adopt_payment_intent: Option<&str>,
        last_error: Option<serde_json::Value>,
    ) -> Result<(), WebhookError> {
        let mut record = None;
        if let Some(id) = session_id {
            record = self.sessions.find_by_session_id(id).await?;
        }
        if record.is_none() {
            if let Some(pi) = payment_intent_id {
                record = self.sessions.find_by_payment_intent(pi).await?;
            }
        }
        if record.is_none() {
            record = self
                .sessions
                .find_latest_for_subscription(&subscription_id)
                .await?;
        }
        let Some(mut record) = record else {
            return Ok(());
        };

        let now = Timestamp::now();
        let mut changed = record.settle(status, now);
        if let Some(pi) = adopt_payment_intent {
            if record.payment_intent_id.as_deref() != Some(pi) {
                record.payment_intent_id = Some(pi.to_string());
                changed = true;
            }
        }
        if last_error.is_some() {
            record.last_error = last_error;
            record.updated_at = now;
            changed = true;
        }
        if changed {
            self.sessions.save(&record).await?;
        }
        Ok(())
    }
}

fn object<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> Result<T, WebhookError> {
    event
        .deserialize_object()
        .map_err(|e| WebhookError::ParseError(format!("{} object: {}", event.event_type, e)))
}
