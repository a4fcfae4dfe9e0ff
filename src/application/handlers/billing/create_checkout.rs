//! CreateCheckoutHandler - turns a plan choice and contact details into a
//! pending subscription and a hosted checkout session.
//!
//! Order of operations:
//!
//! 1. Validate input and price the tier (a bad coupon never blocks).
//! 2. Reserve one coupon use; a cap reached in the meantime drops the coupon.
//! 3. Insert the pending subscription under the duplicate-purchase guard.
//! 4. Find or create the gateway customer (best effort).
//! 5. Create the checkout session and store its local shadow.
//! 6. Mark the subscription `processing`.
//!
//! Any failure after step 2 releases the coupon use; any failure after
//! step 3 marks the subscription `failed`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::handlers::versioned_update::{modify_subscription, Change};
use crate::domain::billing::{
    quote, BillingError, BillingPeriod, CheckoutSessionRecord, ContactDetails, Coupon,
    CouponCode, CouponInvalidReason, CouponRejection, PriceQuote, PricingTier, Subscription,
    SubscriptionStatus, SUBSCRIPTION_ID_METADATA_KEY,
};
use crate::domain::foundation::{CouponId, Money, SubscriptionId, TierId, Timestamp};
use crate::ports::{
    CheckoutSessionRepository, CheckoutSessionRequest, CouponRepository, CustomerRequest,
    InsertOutcome, LineItem, PaymentGateway, PricingTierRepository, SubscriptionLookup,
    SubscriptionRepository,
};

/// Placeholder replaced by the new subscription id in redirect URLs.
pub const SUBSCRIPTION_ID_PLACEHOLDER: &str = "{SUBSCRIPTION_ID}";

/// Deployment-level checkout settings. Redirect URLs always come from here,
/// never from the request.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub tier_id: TierId,
    pub billing_period: BillingPeriod,
    pub coupon_code: Option<String>,
    pub contact: ContactDetails,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    pub subscription_id: SubscriptionId,
    pub checkout_url: String,
    pub session_id: String,
    pub quote: PriceQuote,
    /// Why a requested coupon was not applied.
    pub coupon_message: Option<String>,
}

pub struct CreateCheckoutHandler {
    tiers: Arc<dyn PricingTierRepository>,
    coupons: Arc<dyn CouponRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    sessions: Arc<dyn CheckoutSessionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

impl CreateCheckoutHandler {
    pub fn new(
        tiers: Arc<dyn PricingTierRepository>,
        coupons: Arc<dyn CouponRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        sessions: Arc<dyn CheckoutSessionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            tiers,
            coupons,
            subscriptions,
            sessions,
            gateway,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        validate_contact(&cmd.contact)?;

        // 1. Price
        let tier = self
            .tiers
            .find_by_id(&cmd.tier_id)
            .await?
            .ok_or(BillingError::TierNotFound(cmd.tier_id))?;
        if !tier.is_active {
            return Err(BillingError::TierInactive(tier.name));
        }
        let mut priced = self
            .price(&tier, cmd.billing_period, cmd.coupon_code.as_deref())
            .await?;

        // 2. Reserve coupon
        let reserved = self.reserve_coupon(&mut priced).await?;

        // 3. Guarded insert
        let now = Timestamp::now();
        let subscription = Subscription::new_pending(cmd.contact, &tier, &priced, now);
        let inserted = self
            .subscriptions
            .insert_if_no_open_purchase(&subscription)
            .await;
        match inserted {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::OpenPurchaseExists(existing)) => {
                self.release_coupon(reserved).await;
                tracing::info!(
                    existing_subscription_id = %existing,
                    "Checkout rejected: open purchase exists for email"
                );
                return Err(BillingError::ExistingSubscription { existing });
            }
            Err(e) => {
                self.release_coupon(reserved).await;
                return Err(e.into());
            }
        }

        tracing::info!(
            subscription_id = %subscription.id,
            tier = %tier.name,
            billing_period = %priced.billing_period,
            final_amount = %priced.final_amount,
            coupon = ?subscription.coupon_code,
            "Pending subscription created"
        );

        // 4-6. Gateway
        match self.open_session(&subscription).await {
            Ok((session_id, checkout_url)) => Ok(CreateCheckoutResult {
                subscription_id: subscription.id,
                checkout_url,
                session_id,
                coupon_message: priced.coupon_rejection.as_ref().map(|r| r.message()),
                quote: priced,
            }),
            Err(err) => {
                self.fail_checkout(subscription.id, &err).await;
                self.release_coupon(reserved).await;
                Err(err)
            }
        }
    }

    async fn price(
        &self,
        tier: &PricingTier,
        period: BillingPeriod,
        raw_code: Option<&str>,
    ) -> Result<PriceQuote, BillingError> {
        let now = Timestamp::now();
        let Some(raw) = raw_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(quote(tier, period, None, now));
        };
        let coupon: Option<Coupon> = match CouponCode::parse(raw) {
            Ok(code) => self.coupons.find_by_code(&code).await?,
            Err(_) => None,
        };
        Ok(match coupon {
            Some(coupon) => quote(tier, period, Some(&coupon), now),
            None => quote(tier, period, None, now).without_coupon(CouponRejection::NotFound),
        })
    }

    /// Takes one use of the applied coupon, dropping it from the quote when
    /// the cap is already reached. Returns the coupon to release on failure.
    async fn reserve_coupon(&self, priced: &mut PriceQuote) -> Result<Option<CouponId>, BillingError> {
        let Some(applied) = priced.coupon.clone() else {
            return Ok(None);
        };
        if self.coupons.reserve_use(&applied.id).await? {
            return Ok(Some(applied.id));
        }
        tracing::info!(coupon = %applied.code, "Coupon usage cap reached during checkout");
        *priced = priced.clone().without_coupon(CouponRejection::Invalid {
            reason: CouponInvalidReason::UsageLimitExceeded,
        });
        Ok(None)
    }

    async fn release_coupon(&self, reserved: Option<CouponId>) {
        if let Some(id) = reserved {
            if let Err(e) = self.coupons.release_use(&id).await {
                tracing::error!(coupon_id = %id, error = %e, "Failed to release coupon use");
            }
        }
    }

    /// Creates the gateway session, stores the shadow and moves the
    /// subscription to `processing`.
    async fn open_session(
        &self,
        subscription: &Subscription,
    ) -> Result<(String, String), BillingError> {
        let customer_id = self.find_or_create_customer(subscription).await;

        let request = CheckoutSessionRequest {
            customer_id: customer_id.clone(),
            customer_email: subscription.email.clone(),
            currency: self.settings.currency.clone(),
            line_items: line_items(subscription),
            success_url: redirect_url(&self.settings.success_url, subscription.id),
            cancel_url: redirect_url(&self.settings.cancel_url, subscription.id),
            client_reference_id: subscription.id.to_string(),
            metadata: session_metadata(subscription),
            collect_phone_number: true,
            idempotency_key: Some(format!("checkout-{}", subscription.id)),
        };

        let session = self
            .gateway
            .create_checkout_session(request)
            .await
            .map_err(|e| {
                tracing::error!(
                    subscription_id = %subscription.id,
                    code = %e.code,
                    error = %e.message,
                    "Checkout session creation failed"
                );
                BillingError::PaymentGateway(e.to_string())
            })?;
        let checkout_url = session
            .url
            .clone()
            .ok_or_else(|| BillingError::PaymentGateway("checkout session has no URL".into()))?;

        let mut shadow = CheckoutSessionRecord::open(
            session.id.clone(),
            subscription.id,
            subscription.final_amount,
            self.settings.currency.clone(),
            Some(checkout_url.clone()),
            Timestamp::now(),
        );
        shadow.payment_intent_id = session.payment_intent.clone();
        self.sessions.save(&shadow).await?;

        let session_id = session.id.clone();
        modify_subscription(
            self.subscriptions.as_ref(),
            &SubscriptionLookup::Id(subscription.id),
            |sub| {
                sub.checkout_session_id = Some(session_id.clone());
                sub.record_gateway_ids(customer_id.as_deref(), session.payment_intent.as_deref(), None);
                sub.transition_to(SubscriptionStatus::Processing, Timestamp::now());
                Change::Save(())
            },
        )
        .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            session_id = %session.id,
            "Checkout session created"
        );
        Ok((session.id, checkout_url))
    }

    async fn find_or_create_customer(&self, subscription: &Subscription) -> Option<String> {
        let request = CustomerRequest {
            email: subscription.email.clone(),
            name: subscription.contact_name.clone(),
            phone: subscription.phone.clone(),
            metadata: HashMap::from([
                ("church_name".to_string(), subscription.organization_name.clone()),
                (
                    SUBSCRIPTION_ID_METADATA_KEY.to_string(),
                    subscription.id.to_string(),
                ),
            ]),
        };
        match self.gateway.find_or_create_customer(request).await {
            Ok(customer) => Some(customer.id),
            Err(e) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Customer lookup failed, falling back to email pre-fill"
                );
                None
            }
        }
    }

    async fn fail_checkout(&self, id: SubscriptionId, err: &BillingError) {
        let reason = err.to_string();
        let result = modify_subscription(
            self.subscriptions.as_ref(),
            &SubscriptionLookup::Id(id),
            |sub| {
                if sub.mark_failed(reason.clone(), Timestamp::now()).is_applied() {
                    Change::Save(())
                } else {
                    Change::Keep(())
                }
            },
        )
        .await;
        if let Err(e) = result {
            tracing::error!(subscription_id = %id, error = %e, "Failed to mark checkout failed");
        }
    }
}

fn validate_contact(contact: &ContactDetails) -> Result<(), BillingError> {
    let email = contact.email.trim();
    if email.is_empty() {
        return Err(BillingError::validation("email", "Email is required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(BillingError::validation("email", "Enter a valid email address")),
    }
    if contact.organization_name.trim().is_empty() {
        return Err(BillingError::validation("church_name", "Church name is required"));
    }
    if contact.contact_name.trim().is_empty() {
        return Err(BillingError::validation("contact_name", "Contact name is required"));
    }
    Ok(())
}

/// Base line at the undiscounted price plus a negative discount line, so the
/// lines sum to `final_amount`.
fn line_items(sub: &Subscription) -> Vec<LineItem> {
    let period = match sub.billing_period {
        BillingPeriod::Monthly => "Monthly",
        BillingPeriod::Annual => "Annual",
    };
    let mut items = vec![LineItem {
        name: format!("{} Plan", sub.tier_name),
        description: Some(format!("Church Directory Management - {} Subscription", period)),
        unit_amount: sub.final_amount + sub.discount_amount,
        quantity: 1,
    }];
    if sub.discount_amount.cents() > 0 {
        items.push(LineItem {
            name: match &sub.coupon_code {
                Some(code) => format!("Discount ({})", code),
                None => "Discount".to_string(),
            },
            description: None,
            unit_amount: Money::from_cents(-sub.discount_amount.cents()),
            quantity: 1,
        });
    }
    items
}

fn session_metadata(sub: &Subscription) -> HashMap<String, String> {
    HashMap::from([
        (SUBSCRIPTION_ID_METADATA_KEY.to_string(), sub.id.to_string()),
        ("church_name".to_string(), sub.organization_name.clone()),
        ("contact_name".to_string(), sub.contact_name.clone()),
        ("pricing_tier".to_string(), sub.tier_name.clone()),
        ("billing_period".to_string(), sub.billing_period.as_str().to_string()),
    ])
}

fn redirect_url(template: &str, id: SubscriptionId) -> String {
    template.replace(SUBSCRIPTION_ID_PLACEHOLDER, &id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCheckoutSessionRepository, InMemoryCouponRepository,
        InMemoryPricingTierRepository, InMemorySubscriptionRepository,
    };
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::test_support::{contact, fixed_coupon, percentage_coupon, tier};
    use crate::domain::billing::CheckoutSessionStatus;
    use crate::ports::PaymentError;

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        tiers: InMemoryPricingTierRepository,
        coupons: InMemoryCouponRepository,
        subscriptions: InMemorySubscriptionRepository,
        sessions: InMemoryCheckoutSessionRepository,
        gateway: MockPaymentGateway,
        handler: CreateCheckoutHandler,
    }

    fn fixture() -> Fixture {
        let tiers = InMemoryPricingTierRepository::new();
        let coupons = InMemoryCouponRepository::new();
        let subscriptions = InMemorySubscriptionRepository::new();
        let sessions = InMemoryCheckoutSessionRepository::new();
        let gateway = MockPaymentGateway::new();
        let handler = CreateCheckoutHandler::new(
            Arc::new(tiers.clone()),
            Arc::new(coupons.clone()),
            Arc::new(subscriptions.clone()),
            Arc::new(sessions.clone()),
            Arc::new(gateway.clone()),
            CheckoutSettings {
                currency: "usd".into(),
                success_url: "https://site.test/payment/success/{SUBSCRIPTION_ID}".into(),
                cancel_url: "https://site.test/payment/cancel/{SUBSCRIPTION_ID}".into(),
            },
        );
        Fixture {
            tiers,
            coupons,
            subscriptions,
            sessions,
            gateway,
            handler,
        }
    }

    fn command(tier_id: TierId, coupon: Option<&str>, email: &str) -> CreateCheckoutCommand {
        CreateCheckoutCommand {
            tier_id,
            billing_period: BillingPeriod::Monthly,
            coupon_code: coupon.map(String::from),
            contact: contact(email),
        }
    }

    async fn growth(f: &Fixture) -> PricingTier {
        let t = tier("Growth", 2_500, Some(25_000));
        f.tiers.insert(t.clone()).await;
        t
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Happy path
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn creates_processing_subscription_with_discounted_session() {
        let f = fixture();
        let t = growth(&f).await;
        let coupon = percentage_coupon("WELCOME20", 20);
        f.coupons.insert(coupon.clone()).await;

        let result = f
            .handler
            .handle(command(t.id, Some("welcome20"), "pat@grace.org"))
            .await
            .unwrap();

        assert_eq!(result.quote.base_amount, Money::from_cents(2_500));
        assert_eq!(result.quote.discount_amount, Money::from_cents(500));
        assert_eq!(result.quote.final_amount, Money::from_cents(2_000));
        assert_eq!(result.coupon_message, None);
        assert!(result.checkout_url.starts_with("https://checkout.stripe.test/pay/"));

        let sub = f
            .subscriptions
            .find(&SubscriptionLookup::Id(result.subscription_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Processing);
        assert_eq!(sub.checkout_session_id.as_deref(), Some(result.session_id.as_str()));
        assert_eq!(sub.coupon_code.as_deref(), Some("WELCOME20"));
        assert_eq!(f.coupons.used_count(&coupon.id).await, Some(1));

        let shadow = f
            .sessions
            .find_by_session_id(&result.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shadow.status, CheckoutSessionStatus::Open);
        assert_eq!(shadow.amount, Money::from_cents(2_000));
    }

    #[tokio::test]
    async fn session_request_carries_lines_metadata_and_urls() {
        let f = fixture();
        let t = growth(&f).await;
        f.coupons.insert(percentage_coupon("WELCOME20", 20)).await;

        let result = f
            .handler
            .handle(command(t.id, Some("WELCOME20"), "pat@grace.org"))
            .await
            .unwrap();

        let request = &f.gateway.checkout_requests()[0];
        assert_eq!(request.total(), Money::from_cents(2_000));
        assert_eq!(request.line_items[0].unit_amount, Money::from_cents(2_500));
        assert_eq!(request.line_items[1].name, "Discount (WELCOME20)");
        let id = result.subscription_id.to_string();
        assert_eq!(request.metadata.get("subscription_id"), Some(&id));
        assert_eq!(request.metadata.get("pricing_tier").map(String::as_str), Some("Growth"));
        assert_eq!(request.success_url, format!("https://site.test/payment/success/{}", id));
        assert_eq!(request.idempotency_key, Some(format!("checkout-{}", id)));
        assert!(request.customer_id.is_some());
        assert!(request.collect_phone_number);
    }

    #[tokio::test]
    async fn unknown_coupon_does_not_block_purchase() {
        let f = fixture();
        let t = growth(&f).await;

        let result = f
            .handler
            .handle(command(t.id, Some("NOPE"), "pat@grace.org"))
            .await
            .unwrap();

        assert_eq!(result.quote.final_amount, Money::from_cents(2_500));
        assert_eq!(result.coupon_message.as_deref(), Some("Invalid coupon code."));
        assert_eq!(f.gateway.checkout_requests()[0].line_items.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_coupon_falls_back_to_full_price() {
        let f = fixture();
        let t = growth(&f).await;
        let mut coupon = fixed_coupon("LAST1", 500);
        coupon.max_uses = Some(1);
        coupon.used_count = 1;
        f.coupons.insert(coupon.clone()).await;

        let result = f
            .handler
            .handle(command(t.id, Some("LAST1"), "pat@grace.org"))
            .await
            .unwrap();

        assert_eq!(result.quote.final_amount, Money::from_cents(2_500));
        assert_eq!(
            result.coupon_message.as_deref(),
            Some("Coupon usage limit exceeded")
        );
        assert_eq!(f.coupons.used_count(&coupon.id).await, Some(1));
    }

    #[tokio::test]
    async fn gateway_customer_failure_falls_back_to_email() {
        let f = fixture();
        let t = growth(&f).await;
        f.gateway
            .fail_method("find_or_create_customer", PaymentError::network("down"));

        f.handler
            .handle(command(t.id, None, "pat@grace.org"))
            .await
            .unwrap();

        assert_eq!(f.gateway.checkout_requests()[0].customer_id, None);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections and failures
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn second_open_purchase_for_same_email_is_rejected() {
        let f = fixture();
        let t = growth(&f).await;
        let coupon = percentage_coupon("WELCOME20", 20);
        f.coupons.insert(coupon.clone()).await;
        let first = f
            .handler
            .handle(command(t.id, Some("WELCOME20"), "pat@grace.org"))
            .await
            .unwrap();

        let err = f
            .handler
            .handle(command(t.id, Some("WELCOME20"), "PAT@grace.org "))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BillingError::ExistingSubscription {
                existing: first.subscription_id
            }
        );
        assert_eq!(f.subscriptions.len().await, 1);
        assert_eq!(f.coupons.used_count(&coupon.id).await, Some(1));
    }

    #[tokio::test]
    async fn gateway_failure_marks_failed_and_releases_coupon() {
        let f = fixture();
        let t = growth(&f).await;
        let coupon = percentage_coupon("WELCOME20", 20);
        f.coupons.insert(coupon.clone()).await;
        f.gateway.fail_method(
            "create_checkout_session",
            PaymentError::invalid_request("amount too small"),
        );

        let err = f
            .handler
            .handle(command(t.id, Some("WELCOME20"), "pat@grace.org"))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::PaymentGateway(_)));
        let subs = f.subscriptions.all().await;
        assert_eq!(subs[0].status, SubscriptionStatus::Failed);
        assert!(subs[0].failure_reason.is_some());
        assert_eq!(f.coupons.used_count(&coupon.id).await, Some(0));
    }

    #[tokio::test]
    async fn failed_checkout_does_not_block_a_new_attempt() {
        let f = fixture();
        let t = growth(&f).await;
        f.gateway
            .fail_method("create_checkout_session", PaymentError::network("timeout"));
        let _ = f.handler.handle(command(t.id, None, "pat@grace.org")).await;
        f.gateway.clear_errors();

        let retry = f.handler.handle(command(t.id, None, "pat@grace.org")).await;

        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn inactive_or_unknown_tier_is_rejected() {
        let f = fixture();
        let mut retired = tier("Legacy", 500, None);
        retired.is_active = false;
        f.tiers.insert(retired.clone()).await;

        let inactive = f
            .handler
            .handle(command(retired.id, None, "pat@grace.org"))
            .await
            .unwrap_err();
        let unknown = f
            .handler
            .handle(command(TierId::new(), None, "pat@grace.org"))
            .await
            .unwrap_err();

        assert!(matches!(inactive, BillingError::TierInactive(_)));
        assert!(matches!(unknown, BillingError::TierNotFound(_)));
        assert_eq!(f.gateway.call_count("create_checkout_session"), 0);
    }

    #[tokio::test]
    async fn malformed_email_is_a_validation_error() {
        let f = fixture();
        let t = growth(&f).await;

        let err = f
            .handler
            .handle(command(t.id, None, "not-an-email"))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "email"));
        assert!(f.subscriptions.is_empty().await);
    }
}
