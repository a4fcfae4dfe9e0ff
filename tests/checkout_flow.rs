//! End-to-end checkout: pricing, coupons, the duplicate-purchase guard and
//! coupon reservation symmetry.

mod common;

use church_billing::application::handlers::billing::{
    CancelPendingCheckoutCommand, CancelPendingCheckoutHandler, CancelPendingCheckoutResult,
    ValidateCouponHandler, ValidateCouponQuery,
};
use church_billing::domain::billing::{BillingError, BillingPeriod, SubscriptionStatus};
use church_billing::domain::foundation::Money;

use common::{checkout_event, fixed, percent, Harness};

// ════════════════════════════════════════════════════════════════════════════════
// Pricing
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn percentage_coupon_on_monthly_growth_tier() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    h.add_coupon("WELCOME20", percent(20), None).await;

    let result = h
        .checkout(&growth, BillingPeriod::Monthly, Some("welcome20"), "pat@grace.org")
        .await
        .unwrap();

    assert_eq!(result.quote.base_amount, Money::from_cents(2500));
    assert_eq!(result.quote.discount_amount, Money::from_cents(500));
    assert_eq!(result.quote.final_amount, Money::from_cents(2000));
    let sub = h.subscription(result.subscription_id).await;
    assert_eq!(sub.status, SubscriptionStatus::Processing);
    assert_eq!(sub.coupon_code.as_deref(), Some("WELCOME20"));
    assert_eq!(sub.final_amount, Money::from_cents(2000));
    assert_eq!(h.gateway.call_count("create_checkout_session"), 1);
}

#[tokio::test]
async fn fixed_coupon_respects_minimum_amount() {
    let h = Harness::new();
    let annual = h.add_tier("Community", 1000, Some(10_000)).await;
    let small = h.add_tier("Starter", 5000, None).await;
    h.add_coupon("SPRING10", fixed(1000), Some(10_000)).await;

    let result = h
        .checkout(&annual, BillingPeriod::Annual, Some("SPRING10"), "pat@grace.org")
        .await
        .unwrap();
    assert_eq!(result.quote.base_amount, Money::from_cents(10_000));
    assert_eq!(result.quote.discount_amount, Money::from_cents(1000));
    assert_eq!(result.quote.final_amount, Money::from_cents(9000));

    let preview = ValidateCouponHandler::new(
        h.services.repositories.tiers.clone(),
        h.services.repositories.coupons.clone(),
    )
    .handle(ValidateCouponQuery {
        coupon_code: "SPRING10".into(),
        tier_id: small.id,
        billing_period: BillingPeriod::Monthly,
    })
    .await
    .unwrap();
    assert!(!preview.valid);
    assert!(preview.message.contains("Minimum order amount"));
    assert_eq!(preview.discount_amount, Money::ZERO);
    assert_eq!(preview.final_price, Money::from_cents(5000));
}

#[tokio::test]
async fn unknown_coupon_checks_out_at_full_price() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;

    let result = h
        .checkout(&growth, BillingPeriod::Monthly, Some("NOPE"), "pat@grace.org")
        .await
        .unwrap();

    assert_eq!(result.quote.final_amount, Money::from_cents(2500));
    assert_eq!(result.coupon_message.as_deref(), Some("Invalid coupon code."));
}

// ════════════════════════════════════════════════════════════════════════════════
// Duplicate-purchase guard
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn second_checkout_for_same_email_is_rejected() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    let first = h
        .checkout(&growth, BillingPeriod::Monthly, None, "pat@grace.org")
        .await
        .unwrap();

    let err = h
        .checkout(&growth, BillingPeriod::Monthly, None, "  PAT@Grace.org ")
        .await
        .unwrap_err();

    match err {
        BillingError::ExistingSubscription { existing } => {
            assert_eq!(existing, first.subscription_id)
        }
        other => panic!("expected duplicate rejection, got {:?}", other),
    }
    assert_eq!(h.gateway.call_count("create_checkout_session"), 1);
}

#[tokio::test]
async fn concurrent_checkouts_for_same_email_create_one_purchase() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;

    let (a, b) = tokio::join!(
        h.checkout(&growth, BillingPeriod::Monthly, None, "pat@grace.org"),
        h.checkout(&growth, BillingPeriod::Monthly, None, "pat@grace.org"),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

#[tokio::test]
async fn expired_checkout_frees_email_for_new_purchase() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    let first = h
        .checkout(&growth, BillingPeriod::Monthly, None, "pat@grace.org")
        .await
        .unwrap();
    h.deliver(&checkout_event("evt_exp_1", "checkout.session.expired", &first))
        .await
        .unwrap();

    let second = h
        .checkout(&growth, BillingPeriod::Monthly, None, "pat@grace.org")
        .await;

    assert!(second.is_ok());
}

// ════════════════════════════════════════════════════════════════════════════════
// Coupon reservation
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn coupon_use_is_released_when_checkout_is_cancelled() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    let coupon = h.add_coupon("WELCOME20", percent(20), None).await;
    let result = h
        .checkout(&growth, BillingPeriod::Monthly, Some("WELCOME20"), "pat@grace.org")
        .await
        .unwrap();
    assert_eq!(h.coupons.used_count(&coupon.id).await, Some(1));

    let cancelled = CancelPendingCheckoutHandler::new(
        h.services.repositories.subscriptions.clone(),
        h.services.repositories.sessions.clone(),
        h.services.repositories.coupons.clone(),
        h.services.gateway.clone(),
    )
    .handle(CancelPendingCheckoutCommand {
        subscription_id: result.subscription_id,
    })
    .await
    .unwrap();

    assert!(matches!(cancelled, CancelPendingCheckoutResult::Cancelled));
    assert_eq!(h.coupons.used_count(&coupon.id).await, Some(0));
    assert_eq!(
        h.subscription(result.subscription_id).await.status,
        SubscriptionStatus::Cancelled
    );
}

#[tokio::test]
async fn payment_completed_in_another_tab_survives_cancel() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    let coupon = h.add_coupon("WELCOME20", percent(20), None).await;
    let result = h
        .checkout(&growth, BillingPeriod::Monthly, Some("WELCOME20"), "pat@grace.org")
        .await
        .unwrap();
    h.gateway.complete_session(&result.session_id);

    let cancelled = CancelPendingCheckoutHandler::new(
        h.services.repositories.subscriptions.clone(),
        h.services.repositories.sessions.clone(),
        h.services.repositories.coupons.clone(),
        h.services.gateway.clone(),
    )
    .handle(CancelPendingCheckoutCommand {
        subscription_id: result.subscription_id,
    })
    .await
    .unwrap();
    assert!(matches!(
        cancelled,
        CancelPendingCheckoutResult::NotCancellable { .. }
    ));

    h.deliver(&checkout_event("evt_paid_1", "checkout.session.completed", &result))
        .await
        .unwrap();

    let sub = h.subscription(result.subscription_id).await;
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.start_date.is_some());
    assert_eq!(h.coupons.used_count(&coupon.id).await, Some(1));
}

#[tokio::test]
async fn coupon_use_is_kept_once_payment_completes() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    let coupon = h.add_coupon("WELCOME20", percent(20), None).await;
    let result = h
        .checkout(&growth, BillingPeriod::Monthly, Some("WELCOME20"), "pat@grace.org")
        .await
        .unwrap();

    h.deliver(&checkout_event("evt_done_1", "checkout.session.completed", &result))
        .await
        .unwrap();

    assert_eq!(h.coupons.used_count(&coupon.id).await, Some(1));
}

#[tokio::test]
async fn gateway_failure_releases_coupon_and_fails_purchase() {
    let h = Harness::new();
    let growth = h.add_tier("Growth", 2500, None).await;
    let coupon = h.add_coupon("WELCOME20", percent(20), None).await;
    h.gateway.fail_method(
        "create_checkout_session",
        church_billing::ports::PaymentError::network("connection reset"),
    );

    let err = h
        .checkout(&growth, BillingPeriod::Monthly, Some("WELCOME20"), "pat@grace.org")
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::PaymentGateway(_)));
    assert_eq!(h.coupons.used_count(&coupon.id).await, Some(0));
}
