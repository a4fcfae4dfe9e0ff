//! Read side of the pricing catalog plus atomic coupon usage counters.
//!
//! Tiers and coupons are authored elsewhere; this crate only reads them and
//! moves `used_count`.

use async_trait::async_trait;

use crate::domain::billing::{Coupon, CouponCode, PricingTier};
use crate::domain::foundation::{CouponId, DomainError, TierId};

#[async_trait]
pub trait PricingTierRepository: Send + Sync {
    async fn find_by_id(&self, id: &TierId) -> Result<Option<PricingTier>, DomainError>;

    /// Active tiers ordered by `sort_order`, then monthly price.
    async fn list_active(&self) -> Result<Vec<PricingTier>, DomainError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, DomainError>;

    /// Increments `used_count` iff the coupon is uncapped or under its cap.
    /// Returns false when the cap was already reached.
    async fn reserve_use(&self, id: &CouponId) -> Result<bool, DomainError>;

    /// Decrements `used_count`, never below zero.
    async fn release_use(&self, id: &CouponId) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn _accepts_dyn(_t: &dyn PricingTierRepository, _c: &dyn CouponRepository) {}
}
