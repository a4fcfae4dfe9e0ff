//! ListTiersHandler - the public price list.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PricingTier};
use crate::ports::PricingTierRepository;

pub struct ListTiersHandler {
    tiers: Arc<dyn PricingTierRepository>,
}

impl ListTiersHandler {
    pub fn new(tiers: Arc<dyn PricingTierRepository>) -> Self {
        Self { tiers }
    }

    /// Active tiers in display order.
    pub async fn handle(&self) -> Result<Vec<PricingTier>, BillingError> {
        Ok(self.tiers.list_active().await?)
    }
}
