//! Organization-provisioning backend adapters.

mod client;
mod mock;

pub use client::{BackendApiClient, BackendApiConfig};
pub use mock::{DisabledOrganizationBackend, MockOrganizationBackend};
