//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations across
//! ports. Billing covers the purchase and webhook paths; provisioning covers
//! the backend organization lifecycle.

pub mod billing;
pub mod provisioning;

#[cfg(test)]
pub(crate) mod test_support;
pub(crate) mod versioned_update;
