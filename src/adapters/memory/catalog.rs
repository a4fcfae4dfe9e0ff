//! In-memory pricing tiers and coupons.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{Coupon, CouponCode, PricingTier};
use crate::domain::foundation::{CouponId, DomainError, ErrorCode, TierId};
use crate::ports::{CouponRepository, PricingTierRepository};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPricingTierRepository {
    tiers: Arc<RwLock<HashMap<TierId, PricingTier>>>,
}

impl InMemoryPricingTierRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, tier: PricingTier) {
        self.tiers.write().await.insert(tier.id, tier);
    }
}

#[async_trait]
impl PricingTierRepository for InMemoryPricingTierRepository {
    async fn find_by_id(&self, id: &TierId) -> Result<Option<PricingTier>, DomainError> {
        Ok(self.tiers.read().await.get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<PricingTier>, DomainError> {
        let mut tiers: Vec<_> = self
            .tiers
            .read()
            .await
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        tiers.sort_by_key(|t| (t.sort_order, t.monthly_price));
        Ok(tiers)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCouponRepository {
    coupons: Arc<RwLock<HashMap<CouponId, Coupon>>>,
    fail_release: Arc<AtomicBool>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, coupon: Coupon) {
        self.coupons.write().await.insert(coupon.id, coupon);
    }

    pub async fn used_count(&self, id: &CouponId) -> Option<u32> {
        self.coupons.read().await.get(id).map(|c| c.used_count)
    }

    /// The next `release_use` fails with a database error.
    pub fn fail_next_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, DomainError> {
        Ok(self
            .coupons
            .read()
            .await
            .values()
            .find(|c| &c.code == code)
            .cloned())
    }

    async fn reserve_use(&self, id: &CouponId) -> Result<bool, DomainError> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons
            .get_mut(id)
            .ok_or_else(|| DomainError::new(ErrorCode::CouponNotFound, "coupon not found"))?;
        let capped = matches!(coupon.max_uses, Some(max) if max > 0 && coupon.used_count >= max);
        if capped {
            return Ok(false);
        }
        coupon.used_count = coupon.used_count.saturating_add(1);
        Ok(true)
    }

    async fn release_use(&self, id: &CouponId) -> Result<(), DomainError> {
        if self.fail_release.swap(false, Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "coupon release failed",
            ));
        }
        if let Some(coupon) = self.coupons.write().await.get_mut(id) {
            coupon.used_count = coupon.used_count.saturating_sub(1);
        }
        Ok(())
    }
}
