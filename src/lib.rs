//! Church Billing - subscription checkout and provisioning for the church
//! directory service.
//!
//! Customers pick a pricing tier (optionally with a coupon) and pay through a
//! Stripe hosted checkout. Stripe webhooks are reconciled exactly once into
//! subscription state, and activated subscriptions are provisioned as
//! organizations on the church directory backend, with retries.

pub mod adapters;
pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
