//! Shared harness for the end-to-end tests: in-memory storage, scripted
//! gateway and backend, inline provisioning.

#![allow(dead_code)]

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;

use church_billing::adapters::backend_api::MockOrganizationBackend;
use church_billing::adapters::memory::{
    InMemoryCheckoutSessionRepository, InMemoryCouponRepository, InMemoryPricingTierRepository,
    InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
};
use church_billing::adapters::stripe::MockPaymentGateway;
use church_billing::app::{BillingSettings, Repositories, Services};
use church_billing::application::handlers::billing::{
    CheckoutSettings, CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
};
use church_billing::domain::billing::{
    BillingError, BillingPeriod, ContactDetails, Coupon, CouponCode, Discount, PricingTier,
    Subscription, WebhookError,
};
use church_billing::domain::foundation::{
    CouponId, Money, Percentage, SubscriptionId, TierId, Timestamp,
};
use church_billing::ports::SubscriptionLookup;

pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";

pub struct Harness {
    pub tiers: InMemoryPricingTierRepository,
    pub coupons: InMemoryCouponRepository,
    pub gateway: MockPaymentGateway,
    pub backend: MockOrganizationBackend,
    pub services: Services,
}

pub fn settings() -> BillingSettings {
    BillingSettings {
        checkout: CheckoutSettings {
            currency: "usd".into(),
            success_url: "https://churchdirectory.app/payment/success/{SUBSCRIPTION_ID}".into(),
            cancel_url: "https://churchdirectory.app/payment/cancel/{SUBSCRIPTION_ID}".into(),
        },
        webhook_secret: SecretString::new(WEBHOOK_SECRET.to_string()),
        require_livemode: false,
        integration_enabled: true,
        status_api_token: None,
    }
}

impl Harness {
    pub fn new() -> Self {
        let tiers = InMemoryPricingTierRepository::new();
        let coupons = InMemoryCouponRepository::new();
        let gateway = MockPaymentGateway::new();
        let backend = MockOrganizationBackend::new();
        let repositories = Repositories {
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            tiers: Arc::new(tiers.clone()),
            coupons: Arc::new(coupons.clone()),
            sessions: Arc::new(InMemoryCheckoutSessionRepository::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
        };
        let services = Services::with_inline_dispatcher(
            repositories,
            Arc::new(gateway.clone()),
            Arc::new(backend.clone()),
            settings(),
        );
        Self {
            tiers,
            coupons,
            gateway,
            backend,
            services,
        }
    }

    pub async fn add_tier(&self, name: &str, monthly_cents: i64, annual_cents: Option<i64>) -> PricingTier {
        let tier = PricingTier {
            id: TierId::new(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: format!("{} plan", name),
            max_users: 0,
            monthly_price: Money::from_cents(monthly_cents),
            annual_price: annual_cents.map(Money::from_cents),
            features: vec!["Member directory".to_string()],
            is_popular: false,
            is_active: true,
            sort_order: 0,
        };
        self.tiers.insert(tier.clone()).await;
        tier
    }

    pub async fn add_coupon(&self, code: &str, discount: Discount, minimum_cents: Option<i64>) -> Coupon {
        let coupon = Coupon {
            id: CouponId::new(),
            code: CouponCode::parse(code).unwrap(),
            name: code.to_string(),
            description: discount.to_string(),
            discount,
            max_uses: None,
            used_count: 0,
            minimum_amount: minimum_cents.map(Money::from_cents),
            valid_from: None,
            valid_until: None,
            applicable_tiers: vec![],
            is_active: true,
            created_at: Timestamp::now(),
        };
        self.coupons.insert(coupon.clone()).await;
        coupon
    }

    pub fn checkout_handler(&self) -> CreateCheckoutHandler {
        let repos = &self.services.repositories;
        CreateCheckoutHandler::new(
            repos.tiers.clone(),
            repos.coupons.clone(),
            repos.subscriptions.clone(),
            repos.sessions.clone(),
            self.services.gateway.clone(),
            self.services.settings.checkout.clone(),
        )
    }

    pub async fn checkout(
        &self,
        tier: &PricingTier,
        period: BillingPeriod,
        coupon: Option<&str>,
        email: &str,
    ) -> Result<CreateCheckoutResult, BillingError> {
        self.checkout_handler()
            .handle(CreateCheckoutCommand {
                tier_id: tier.id,
                billing_period: period,
                coupon_code: coupon.map(str::to_string),
                contact: contact(email),
            })
            .await
    }

    pub async fn deliver(&self, event: &Value) -> Result<ProcessWebhookResult, WebhookError> {
        let payload = event.to_string();
        let ts = chrono::Utc::now().timestamp();
        let handler = ProcessWebhookHandler::new(
            self.services.settings.verifier(),
            self.services.repositories.webhook_events.clone(),
            self.services.reconciler(),
        );
        handler
            .handle(ProcessWebhookCommand {
                signature: format!("t={},v1={}", ts, sign(ts, &payload)),
                payload: payload.into_bytes(),
            })
            .await
    }

    pub async fn subscription(&self, id: SubscriptionId) -> Subscription {
        self.services
            .repositories
            .subscriptions
            .find(&SubscriptionLookup::Id(id))
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn contact(email: &str) -> ContactDetails {
    ContactDetails {
        email: email.to_string(),
        organization_name: "Grace Community Church".to_string(),
        contact_name: "Pat Jones".to_string(),
        phone: Some("555-0100".to_string()),
    }
}

pub fn percent(value: u8) -> Discount {
    Discount::Percentage(Percentage::new(value))
}

pub fn fixed(cents: i64) -> Discount {
    Discount::Fixed(Money::from_cents(cents))
}

pub fn sign(timestamp: i64, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn checkout_event(event_id: &str, event_type: &str, checkout: &CreateCheckoutResult) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": {
            "id": checkout.session_id,
            "customer": "cus_int_1",
            "payment_intent": "pi_int_1",
            "payment_status": "paid",
            "metadata": { "subscription_id": checkout.subscription_id.to_string() }
        } }
    })
}
