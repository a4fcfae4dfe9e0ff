//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage
//!
//! - `SubscriptionRepository` - purchase records, guarded insert, versioned update
//! - `PricingTierRepository`, `CouponRepository` - catalog reads and coupon counters
//! - `CheckoutSessionRepository` - local shadow of gateway sessions
//! - `WebhookEventRepository` - inbound event log and dedup claims
//!
//! ## External services
//!
//! - `PaymentGateway` - Stripe
//! - `OrganizationBackend` - tenant provisioning API
//! - `TaskDispatcher` - background provisioning hand-off

mod catalog;
mod checkout_session_repository;
mod organization_backend;
mod payment_gateway;
mod subscription_repository;
mod task_dispatcher;
mod webhook_event_repository;

pub use catalog::{CouponRepository, PricingTierRepository};
pub use checkout_session_repository::CheckoutSessionRepository;
pub use organization_backend::{
    BackendError, CreateOrganizationRequest, CreatedOrganization, OrganizationBackend,
};
pub use payment_gateway::{
    CheckoutSessionRequest, CreatedCheckoutSession, CustomerRequest, GatewayCheckoutSession,
    GatewayCustomer, LineItem, PaymentError, PaymentErrorCode, PaymentGateway,
};
pub use subscription_repository::{
    InsertOutcome, IntegrationCounts, SubscriptionLookup, SubscriptionRepository,
};
pub use task_dispatcher::{DispatchError, ProvisioningTask, TaskDispatcher, TaskRunner};
pub use webhook_event_repository::{ClaimOutcome, WebhookEventRepository, DEFAULT_CLAIM_LEASE};
