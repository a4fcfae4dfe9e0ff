//! Composition root: turns an [`AppConfig`] into wired ports and handlers.
//!
//! Both the HTTP server and the operator commands start here, so every
//! entry point sees the same repositories, gateway and dispatcher.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;

use crate::adapters::backend_api::{
    BackendApiClient, BackendApiConfig, DisabledOrganizationBackend,
};
use crate::adapters::memory::{
    InMemoryCheckoutSessionRepository, InMemoryCouponRepository, InMemoryPricingTierRepository,
    InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
};
use crate::adapters::postgres::{
    PostgresCheckoutSessionRepository, PostgresCouponRepository, PostgresPricingTierRepository,
    PostgresSubscriptionRepository, PostgresWebhookEventRepository,
};
use crate::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use crate::adapters::tasks::{
    InlineTaskDispatcher, QueueSettings, QueuedTaskDispatcher, RetryPolicy, TaskWorkers,
};
use crate::application::handlers::billing::{CheckoutSettings, EventReconciler};
use crate::application::handlers::provisioning::ProvisioningCoordinator;
use crate::config::{AppConfig, BackendConfig, DispatchMode, PaymentConfig, TasksConfig};
use crate::domain::billing::StripeWebhookVerifier;
use crate::ports::{
    BackendError, CheckoutSessionRepository, CouponRepository, OrganizationBackend, PaymentError,
    PaymentGateway, PricingTierRepository, SubscriptionRepository, TaskDispatcher, TaskRunner,
    WebhookEventRepository,
};

/// Every storage port, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub tiers: Arc<dyn PricingTierRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub sessions: Arc<dyn CheckoutSessionRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
            tiers: Arc::new(PostgresPricingTierRepository::new(pool.clone())),
            coupons: Arc::new(PostgresCouponRepository::new(pool.clone())),
            sessions: Arc::new(PostgresCheckoutSessionRepository::new(pool.clone())),
            webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool)),
        }
    }

    /// Fresh, empty in-memory storage.
    pub fn in_memory() -> Self {
        Self {
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            tiers: Arc::new(InMemoryPricingTierRepository::new()),
            coupons: Arc::new(InMemoryCouponRepository::new()),
            sessions: Arc::new(InMemoryCheckoutSessionRepository::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
        }
    }
}

/// Deployment-level settings the request handlers need.
#[derive(Clone)]
pub struct BillingSettings {
    pub checkout: CheckoutSettings,
    pub webhook_secret: SecretString,
    pub require_livemode: bool,
    /// Whether activation schedules organization provisioning.
    pub integration_enabled: bool,
    /// Bearer token for the status API; `None` rejects every request.
    pub status_api_token: Option<SecretString>,
}

impl BillingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let base = &config.server.public_base_url;
        Self {
            checkout: CheckoutSettings {
                currency: config.payment.currency.clone(),
                success_url: config.payment.success_url_for(base),
                cancel_url: config.payment.cancel_url_for(base),
            },
            webhook_secret: config.payment.webhook_secret(),
            require_livemode: config.payment.require_livemode,
            integration_enabled: config.backend.integration_active(),
            status_api_token: config.status_api.token(),
        }
    }

    pub fn verifier(&self) -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(self.webhook_secret.clone())
            .with_require_livemode(self.require_livemode)
    }
}

/// Everything a request or command needs, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub repositories: Repositories,
    pub gateway: Arc<dyn PaymentGateway>,
    pub backend: Arc<dyn OrganizationBackend>,
    pub coordinator: Arc<ProvisioningCoordinator>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub settings: BillingSettings,
}

impl Services {
    /// Wires services around an already constructed dispatcher.
    pub fn new(
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        backend: Arc<dyn OrganizationBackend>,
        dispatcher: Arc<dyn TaskDispatcher>,
        settings: BillingSettings,
    ) -> Self {
        let coordinator = Arc::new(ProvisioningCoordinator::new(
            repositories.subscriptions.clone(),
            backend.clone(),
        ));
        Self {
            repositories,
            gateway,
            backend,
            coordinator,
            dispatcher,
            settings,
        }
    }

    /// Services whose provisioning tasks run in the caller, sharing one
    /// coordinator with the dispatcher.
    pub fn with_inline_dispatcher(
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        backend: Arc<dyn OrganizationBackend>,
        settings: BillingSettings,
    ) -> Self {
        let coordinator = Arc::new(ProvisioningCoordinator::new(
            repositories.subscriptions.clone(),
            backend.clone(),
        ));
        let dispatcher: Arc<dyn TaskDispatcher> =
            Arc::new(InlineTaskDispatcher::new(coordinator.clone()));
        Self {
            repositories,
            gateway,
            backend,
            coordinator,
            dispatcher,
            settings,
        }
    }

    pub fn reconciler(&self) -> EventReconciler {
        EventReconciler::new(
            self.repositories.subscriptions.clone(),
            self.repositories.sessions.clone(),
            self.repositories.coupons.clone(),
            self.dispatcher.clone(),
            self.settings.integration_enabled,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("payment gateway: {0}")]
    Payment(#[from] PaymentError),

    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
}

pub fn payment_gateway(config: &PaymentConfig) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
    let mut stripe = StripeConfig::new(config.api_key());
    if let Some(base) = &config.stripe_api_base {
        stripe = stripe.with_base_url(base.clone());
    }
    Ok(Arc::new(StripePaymentAdapter::new(stripe)?))
}

/// The backend client, or a stand-in that refuses every call when no
/// backend URL is configured.
pub fn organization_backend(
    config: &BackendConfig,
) -> Result<Arc<dyn OrganizationBackend>, BackendError> {
    match config.endpoint() {
        Some(url) => {
            let client_config =
                BackendApiConfig::new(url, config.api_key()).with_timeout(config.timeout());
            Ok(Arc::new(BackendApiClient::new(client_config)?))
        }
        None => {
            tracing::warn!("No backend URL configured; organization provisioning is disabled");
            Ok(Arc::new(DisabledOrganizationBackend))
        }
    }
}

pub fn retry_policy(config: &TasksConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_attempts,
        initial_delay: config.initial_delay(),
        max_delay: config.max_delay(),
    }
}

/// Starts the configured dispatcher. Queued mode also returns the worker
/// handles, which the caller shuts down on exit.
pub fn start_dispatcher(
    config: &TasksConfig,
    runner: Arc<dyn TaskRunner>,
) -> (Arc<dyn TaskDispatcher>, Option<TaskWorkers>) {
    match config.mode {
        DispatchMode::Queued => {
            let settings = QueueSettings {
                workers: config.workers,
                capacity: config.queue_capacity,
                retry: retry_policy(config),
            };
            let (dispatcher, workers) = QueuedTaskDispatcher::start(runner, settings);
            tracing::info!(
                workers = config.workers,
                capacity = config.queue_capacity,
                "Task queue started"
            );
            (Arc::new(dispatcher), Some(workers))
        }
        DispatchMode::Inline => (Arc::new(InlineTaskDispatcher::new(runner)), None),
    }
}

/// Builds [`Services`] from configuration on top of the given storage.
pub fn build_services(
    config: &AppConfig,
    repositories: Repositories,
) -> Result<(Services, Option<TaskWorkers>), WiringError> {
    let gateway = payment_gateway(&config.payment)?;
    let backend = organization_backend(&config.backend)?;
    let coordinator = Arc::new(ProvisioningCoordinator::new(
        repositories.subscriptions.clone(),
        backend.clone(),
    ));
    let (dispatcher, workers) = start_dispatcher(&config.tasks, coordinator.clone());
    let services = Services {
        repositories,
        gateway,
        backend,
        coordinator,
        dispatcher,
        settings: BillingSettings::from_config(config),
    };
    Ok((services, workers))
}
