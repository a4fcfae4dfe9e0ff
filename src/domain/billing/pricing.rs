//! Pricing tiers, billing periods and price quotes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::coupon::{Coupon, CouponCode, CouponInvalidReason};
use crate::domain::foundation::{CouponId, Money, TierId, Timestamp, ValidationError};

/// How often a subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    #[default]
    Monthly,
    Annual,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Annual => "annual",
        }
    }

    /// Lenient parse used on customer input: anything unrecognised is monthly.
    pub fn parse_or_monthly(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }

    /// The end of one billing period starting at `from`.
    pub fn advance(&self, from: Timestamp) -> Timestamp {
        match self {
            BillingPeriod::Monthly => from.add_months(1),
            BillingPeriod::Annual => from.add_years(1),
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingPeriod::Monthly),
            "annual" | "yearly" => Ok(BillingPeriod::Annual),
            other => Err(ValidationError::invalid_format(
                "billing_period",
                format!("expected monthly or annual, got '{}'", other),
            )),
        }
    }
}

/// A named plan with a price per period.
///
/// Subscriptions copy the amount they were charged, so editing a tier
/// never changes existing purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTier {
    pub id: TierId,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// Zero means unlimited.
    pub max_users: u32,
    pub monthly_price: Money,
    pub annual_price: Option<Money>,
    pub features: Vec<String>,
    pub is_popular: bool,
    pub is_active: bool,
    pub sort_order: i32,
}

impl PricingTier {
    pub fn has_unlimited_users(&self) -> bool {
        self.max_users == 0
    }

    /// Monthly price times twelve minus the annual price, when annual exists.
    pub fn annual_savings(&self) -> Option<Money> {
        self.annual_price.map(|annual| {
            Money::from_cents(self.monthly_price.cents().saturating_mul(12))
                .saturating_sub_floor_zero(annual)
        })
    }
}

/// Amount owed for one period, plus the period actually being charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrice {
    pub amount: Money,
    pub period: BillingPeriod,
}

/// Picks the tier price for `period`.
///
/// Annual falls back to monthly when the tier has no annual price. The
/// returned `period` is then `Monthly`, so the purchase is recorded and
/// renewed as what was actually charged.
pub fn resolve_base_amount(tier: &PricingTier, period: BillingPeriod) -> ResolvedPrice {
    match (period, tier.annual_price) {
        (BillingPeriod::Annual, Some(annual)) => ResolvedPrice {
            amount: annual,
            period: BillingPeriod::Annual,
        },
        _ => ResolvedPrice {
            amount: tier.monthly_price,
            period: BillingPeriod::Monthly,
        },
    }
}

/// Why a requested coupon did not reduce the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Invalid { reason: CouponInvalidReason },
    NotApplicableToTier,
    BelowMinimum { minimum: Money },
}

impl CouponRejection {
    /// Customer-facing explanation.
    pub fn message(&self) -> String {
        match self {
            CouponRejection::NotFound => "Invalid coupon code.".to_string(),
            CouponRejection::Invalid { reason } => reason.to_string(),
            CouponRejection::NotApplicableToTier => {
                "This coupon cannot be applied to the selected plan.".to_string()
            }
            CouponRejection::BelowMinimum { minimum } => {
                format!("Minimum order amount of {} required for this coupon.", minimum)
            }
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub id: CouponId,
    pub code: CouponCode,
}

/// A fully computed price for one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub tier_id: TierId,
    pub billing_period: BillingPeriod,
    pub base_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub coupon: Option<AppliedCoupon>,
    pub coupon_rejection: Option<CouponRejection>,
}

impl PriceQuote {
    /// Drops any applied coupon and reports why.
    pub fn without_coupon(mut self, rejection: CouponRejection) -> Self {
        self.coupon = None;
        self.discount_amount = Money::ZERO;
        self.final_amount = self.base_amount;
        self.coupon_rejection = Some(rejection);
        self
    }

    pub fn has_discount(&self) -> bool {
        self.discount_amount > Money::ZERO
    }
}

/// Prices `tier` for `period`, applying `coupon` when it passes every gate.
///
/// Gates run in order: validity, tier applicability, minimum purchase. A
/// failed gate leaves the price undiscounted and records the rejection; a
/// bad coupon never blocks a purchase.
pub fn quote(
    tier: &PricingTier,
    period: BillingPeriod,
    coupon: Option<&Coupon>,
    now: Timestamp,
) -> PriceQuote {
    let resolved = resolve_base_amount(tier, period);
    let base = PriceQuote {
        tier_id: tier.id,
        billing_period: resolved.period,
        base_amount: resolved.amount,
        discount_amount: Money::ZERO,
        final_amount: resolved.amount,
        coupon: None,
        coupon_rejection: None,
    };

    let Some(coupon) = coupon else {
        return base;
    };

    if let Err(reason) = coupon.check_valid(now) {
        return base.without_coupon(CouponRejection::Invalid { reason });
    }
    if !coupon.can_apply_to_tier(&tier.id) {
        return base.without_coupon(CouponRejection::NotApplicableToTier);
    }
    if !coupon.meets_minimum(resolved.amount) {
        let minimum = coupon.minimum_amount.unwrap_or(Money::ZERO);
        return base.without_coupon(CouponRejection::BelowMinimum { minimum });
    }

    let discount = coupon.calculate_discount(resolved.amount);
    PriceQuote {
        discount_amount: discount,
        final_amount: resolved.amount.saturating_sub_floor_zero(discount),
        coupon: Some(AppliedCoupon {
            id: coupon.id,
            code: coupon.code.clone(),
        }),
        ..base
    }
}
