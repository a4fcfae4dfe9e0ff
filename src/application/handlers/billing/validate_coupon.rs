//! ValidateCouponHandler - previews a coupon against a tier without using it.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::billing::{quote, BillingError, BillingPeriod, CouponCode, CouponRejection};
use crate::domain::foundation::{Money, TierId, Timestamp};
use crate::ports::{CouponRepository, PricingTierRepository};

#[derive(Debug, Clone)]
pub struct ValidateCouponQuery {
    pub coupon_code: String,
    pub tier_id: TierId,
    pub billing_period: BillingPeriod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateCouponResult {
    pub valid: bool,
    pub message: String,
    pub discount_amount: Money,
    pub final_price: Money,
}

impl ValidateCouponResult {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            discount_amount: Money::ZERO,
            final_price: Money::ZERO,
        }
    }
}

pub struct ValidateCouponHandler {
    tiers: Arc<dyn PricingTierRepository>,
    coupons: Arc<dyn CouponRepository>,
}

impl ValidateCouponHandler {
    pub fn new(tiers: Arc<dyn PricingTierRepository>, coupons: Arc<dyn CouponRepository>) -> Self {
        Self { tiers, coupons }
    }

    pub async fn handle(&self, query: ValidateCouponQuery) -> Result<ValidateCouponResult, BillingError> {
        if query.coupon_code.trim().is_empty() {
            return Ok(ValidateCouponResult::invalid("Please enter a coupon code."));
        }
        let not_found = CouponRejection::NotFound.message();

        let Ok(code) = CouponCode::parse(&query.coupon_code) else {
            return Ok(ValidateCouponResult::invalid(not_found));
        };
        let Some(tier) = self
            .tiers
            .find_by_id(&query.tier_id)
            .await?
            .filter(|t| t.is_active)
        else {
            return Ok(ValidateCouponResult::invalid(not_found));
        };
        let Some(coupon) = self.coupons.find_by_code(&code).await? else {
            return Ok(ValidateCouponResult::invalid(not_found));
        };

        let priced = quote(&tier, query.billing_period, Some(&coupon), Timestamp::now());
        if let Some(rejection) = &priced.coupon_rejection {
            return Ok(ValidateCouponResult {
                valid: false,
                message: rejection.message(),
                discount_amount: Money::ZERO,
                final_price: priced.final_amount,
            });
        }

        let message = if coupon.description.trim().is_empty() {
            coupon.name.clone()
        } else {
            coupon.description.clone()
        };
        Ok(ValidateCouponResult {
            valid: true,
            message,
            discount_amount: priced.discount_amount,
            final_price: priced.final_amount,
        })
    }
}
