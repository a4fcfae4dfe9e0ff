//! CancelPendingCheckoutHandler - the customer backed out of the hosted page.
//!
//! Only an unpaid purchase (`pending` or `processing`) is cancelled, and only
//! after the gateway session is closed: a session the customer paid in
//! another tab must stay payable so the completion webhook can activate it.
//! The coupon use taken at checkout is handed back once.

use std::sync::Arc;

use crate::application::handlers::billing::coupon_release::release_owed_coupon;
use crate::application::handlers::versioned_update::{modify_subscription, Change};
use crate::domain::billing::{
    BillingError, CheckoutSessionStatus, SubscriptionStatus, Transition,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    CheckoutSessionRepository, CouponRepository, PaymentError, PaymentGateway,
    SubscriptionLookup, SubscriptionRepository,
};

#[derive(Debug, Clone)]
pub struct CancelPendingCheckoutCommand {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelPendingCheckoutResult {
    Cancelled,
    /// Nothing changed; the purchase is in `status`.
    NotCancellable { status: SubscriptionStatus },
}

/// State of the hosted session once we tried to close it.
enum SessionClosure {
    /// The session can no longer take a payment.
    Closed,
    /// The customer already paid.
    Paid,
}

pub struct CancelPendingCheckoutHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    sessions: Arc<dyn CheckoutSessionRepository>,
    coupons: Arc<dyn CouponRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CancelPendingCheckoutHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        sessions: Arc<dyn CheckoutSessionRepository>,
        coupons: Arc<dyn CouponRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            subscriptions,
            sessions,
            coupons,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelPendingCheckoutCommand,
    ) -> Result<CancelPendingCheckoutResult, BillingError> {
        let id = cmd.subscription_id;
        let lookup = SubscriptionLookup::Id(id);
        let current = self
            .subscriptions
            .find(&lookup)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(id))?;

        if !current.status.is_awaiting_payment() {
            return Ok(not_cancellable(id, current.status));
        }

        if let Some(session_id) = current.checkout_session_id.as_deref() {
            if let SessionClosure::Paid = self.close_session(session_id).await? {
                tracing::warn!(
                    subscription_id = %id,
                    session_id,
                    "Cancel refused: checkout session was already paid"
                );
                return Ok(CancelPendingCheckoutResult::NotCancellable {
                    status: current.status,
                });
            }
        }

        let (subscription, transition) = modify_subscription(
            self.subscriptions.as_ref(),
            &lookup,
            |sub| {
                if !sub.status.is_awaiting_payment() {
                    return Change::Keep(Transition::Unchanged);
                }
                let transition = sub.cancel(Timestamp::now());
                if transition.is_applied() {
                    sub.failure_reason = Some("Checkout cancelled by customer".into());
                    Change::Save(transition)
                } else {
                    Change::Keep(transition)
                }
            },
        )
        .await?
        .ok_or(BillingError::SubscriptionNotFound(id))?;

        if !transition.is_applied() {
            return Ok(not_cancellable(id, subscription.status));
        }

        if let Err(e) =
            release_owed_coupon(self.subscriptions.as_ref(), self.coupons.as_ref(), id).await
        {
            // The expiry webhook for the closed session retries the release.
            tracing::error!(subscription_id = %id, error = %e, "Failed to release coupon use");
        }

        if let Some(session_id) = subscription.checkout_session_id.as_deref() {
            self.settle_shadow(session_id).await;
        }

        tracing::info!(subscription_id = %id, "Pending checkout cancelled");
        Ok(CancelPendingCheckoutResult::Cancelled)
    }

    /// Expires the hosted session. When the gateway refuses, its own view of
    /// the session decides; an unreadable session leaves everything as is.
    async fn close_session(&self, session_id: &str) -> Result<SessionClosure, BillingError> {
        if let Some(shadow) = self.sessions.find_by_session_id(session_id).await? {
            if shadow.status == CheckoutSessionStatus::Completed {
                return Ok(SessionClosure::Paid);
            }
        }

        let refused = match self.gateway.expire_checkout_session(session_id).await {
            Ok(()) => return Ok(SessionClosure::Closed),
            Err(e) => e,
        };
        tracing::info!(session_id, error = %refused, "Gateway refused to expire checkout session");

        let session = self
            .gateway
            .retrieve_checkout_session(session_id)
            .await
            .map_err(gateway_error)?;
        match session {
            None => Ok(SessionClosure::Closed),
            Some(s) if s.payment_status.as_deref() == Some("paid") => Ok(SessionClosure::Paid),
            Some(s) if s.status.as_deref() == Some("complete") => Ok(SessionClosure::Paid),
            Some(s) if s.status.as_deref() == Some("expired") => Ok(SessionClosure::Closed),
            Some(_) => Err(gateway_error(refused)),
        }
    }

    async fn settle_shadow(&self, session_id: &str) {
        match self.sessions.find_by_session_id(session_id).await {
            Ok(Some(mut record)) => {
                if record.settle(CheckoutSessionStatus::Cancelled, Timestamp::now()) {
                    if let Err(e) = self.sessions.save(&record).await {
                        tracing::error!(session_id, error = %e, "Failed to update session shadow");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(session_id, error = %e, "Failed to load session shadow"),
        }
    }
}

fn not_cancellable(id: SubscriptionId, status: SubscriptionStatus) -> CancelPendingCheckoutResult {
    tracing::info!(subscription_id = %id, %status, "Checkout cancel ignored");
    CancelPendingCheckoutResult::NotCancellable { status }
}

fn gateway_error(e: PaymentError) -> BillingError {
    BillingError::PaymentGateway(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCheckoutSessionRepository, InMemoryCouponRepository,
        InMemorySubscriptionRepository,
    };
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::test_support::{pending_subscription, percentage_coupon};
    use crate::domain::billing::CheckoutSessionRecord;
    use crate::ports::{CouponRepository as _, GatewayCheckoutSession};

    struct Fixture {
        subscriptions: InMemorySubscriptionRepository,
        sessions: InMemoryCheckoutSessionRepository,
        coupons: InMemoryCouponRepository,
        gateway: MockPaymentGateway,
        handler: CancelPendingCheckoutHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = InMemorySubscriptionRepository::new();
        let sessions = InMemoryCheckoutSessionRepository::new();
        let coupons = InMemoryCouponRepository::new();
        let gateway = MockPaymentGateway::new();
        let handler = CancelPendingCheckoutHandler::new(
            Arc::new(subscriptions.clone()),
            Arc::new(sessions.clone()),
            Arc::new(coupons.clone()),
            Arc::new(gateway.clone()),
        );
        Fixture {
            subscriptions,
            sessions,
            coupons,
            gateway,
            handler,
        }
    }

    /// A processing purchase that used one coupon reservation.
    async fn seeded(f: &Fixture) -> (SubscriptionId, crate::domain::foundation::CouponId) {
        let coupon = percentage_coupon("WELCOME20", 20);
        f.coupons.insert(coupon.clone()).await;
        assert!(f.coupons.reserve_use(&coupon.id).await.unwrap());

        let mut sub = pending_subscription("pat@grace.org");
        sub.coupon_id = Some(coupon.id);
        sub.checkout_session_id = Some("cs_1".into());
        sub.transition_to(SubscriptionStatus::Processing, Timestamp::now());
        f.sessions
            .save(&CheckoutSessionRecord::open(
                "cs_1",
                sub.id,
                sub.final_amount,
                "usd",
                None,
                Timestamp::now(),
            ))
            .await
            .unwrap();
        let id = sub.id;
        f.subscriptions.put(sub).await;
        (id, coupon.id)
    }

    fn cmd(id: SubscriptionId) -> CancelPendingCheckoutCommand {
        CancelPendingCheckoutCommand { subscription_id: id }
    }

    #[tokio::test]
    async fn cancels_and_releases_coupon_once() {
        let f = fixture();
        let (id, coupon_id) = seeded(&f).await;

        let first = f.handler.handle(cmd(id)).await.unwrap();
        let second = f.handler.handle(cmd(id)).await.unwrap();

        assert_eq!(first, CancelPendingCheckoutResult::Cancelled);
        assert_eq!(
            second,
            CancelPendingCheckoutResult::NotCancellable {
                status: SubscriptionStatus::Cancelled
            }
        );
        assert_eq!(f.coupons.used_count(&coupon_id).await, Some(0));
        let shadow = f.sessions.find_by_session_id("cs_1").await.unwrap().unwrap();
        assert_eq!(shadow.status, CheckoutSessionStatus::Cancelled);
        assert_eq!(f.gateway.call_count("expire_checkout_session"), 1);
    }

    async fn status_of(f: &Fixture, id: SubscriptionId) -> SubscriptionStatus {
        f.subscriptions
            .find(&SubscriptionLookup::Id(id))
            .await
            .unwrap()
            .unwrap()
            .status
    }

    fn open_gateway_session(f: &Fixture) {
        f.gateway.set_session(GatewayCheckoutSession {
            id: "cs_1".into(),
            status: Some("open".into()),
            payment_status: Some("unpaid".into()),
            payment_intent: Some("pi_1".into()),
            customer: None,
        });
    }

    #[tokio::test]
    async fn session_paid_in_another_tab_is_not_cancelled() {
        let f = fixture();
        let (id, coupon_id) = seeded(&f).await;
        open_gateway_session(&f);
        f.gateway.complete_session("cs_1");

        let result = f.handler.handle(cmd(id)).await.unwrap();

        assert_eq!(
            result,
            CancelPendingCheckoutResult::NotCancellable {
                status: SubscriptionStatus::Processing
            }
        );
        assert_eq!(status_of(&f, id).await, SubscriptionStatus::Processing);
        assert_eq!(f.coupons.used_count(&coupon_id).await, Some(1));
    }

    #[tokio::test]
    async fn completed_shadow_skips_the_gateway() {
        let f = fixture();
        let (id, _) = seeded(&f).await;
        let mut shadow = f.sessions.find_by_session_id("cs_1").await.unwrap().unwrap();
        shadow.settle(CheckoutSessionStatus::Completed, Timestamp::now());
        f.sessions.save(&shadow).await.unwrap();

        let result = f.handler.handle(cmd(id)).await.unwrap();

        assert!(matches!(result, CancelPendingCheckoutResult::NotCancellable { .. }));
        assert_eq!(f.gateway.call_count("expire_checkout_session"), 0);
    }

    #[tokio::test]
    async fn unknown_gateway_state_changes_nothing() {
        let f = fixture();
        let (id, coupon_id) = seeded(&f).await;
        f.gateway
            .fail_method("expire_checkout_session", PaymentError::network("timeout"));
        f.gateway
            .fail_method("retrieve_checkout_session", PaymentError::network("timeout"));

        let err = f.handler.handle(cmd(id)).await.unwrap_err();

        assert!(matches!(err, BillingError::PaymentGateway(_)));
        assert_eq!(status_of(&f, id).await, SubscriptionStatus::Processing);
        assert_eq!(f.coupons.used_count(&coupon_id).await, Some(1));
    }

    #[tokio::test]
    async fn session_already_expired_at_gateway_is_cancelled() {
        let f = fixture();
        let (id, coupon_id) = seeded(&f).await;
        f.gateway.set_session(GatewayCheckoutSession {
            id: "cs_1".into(),
            status: Some("expired".into()),
            payment_status: Some("unpaid".into()),
            payment_intent: None,
            customer: None,
        });

        let result = f.handler.handle(cmd(id)).await.unwrap();

        assert_eq!(result, CancelPendingCheckoutResult::Cancelled);
        assert_eq!(f.coupons.used_count(&coupon_id).await, Some(0));
    }

    #[tokio::test]
    async fn active_subscription_is_not_cancelled() {
        let f = fixture();
        let (id, coupon_id) = seeded(&f).await;
        let mut sub = f
            .subscriptions
            .find(&SubscriptionLookup::Id(id))
            .await
            .unwrap()
            .unwrap();
        sub.activate(Timestamp::now());
        f.subscriptions.put(sub).await;

        let result = f.handler.handle(cmd(id)).await.unwrap();

        assert_eq!(
            result,
            CancelPendingCheckoutResult::NotCancellable {
                status: SubscriptionStatus::Active
            }
        );
        assert_eq!(f.coupons.used_count(&coupon_id).await, Some(1));
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let f = fixture();
        let err = f.handler.handle(cmd(SubscriptionId::new())).await.unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound(_)));
    }
}
