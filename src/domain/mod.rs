//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, money, timestamps, errors)
//! - `billing` - Pricing, coupons, subscription lifecycle, webhook vocabulary

pub mod billing;
pub mod foundation;
