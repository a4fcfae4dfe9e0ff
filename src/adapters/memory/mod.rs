//! In-memory storage adapters.
//!
//! Used by tests and by `serve` when no database URL is configured.
//! State lives for the life of the process.

mod catalog;
mod checkout_session_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use catalog::{InMemoryCouponRepository, InMemoryPricingTierRepository};
pub use checkout_session_repository::InMemoryCheckoutSessionRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
