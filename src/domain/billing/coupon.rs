//! Coupon value objects and validity rules.
//!
//! A coupon can be *invalid* (inactive, outside its window, exhausted) or
//! valid but *inapplicable* (wrong tier, below the minimum purchase). The
//! two are kept apart so checkout can tell the customer which one happened.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{CouponId, Money, Percentage, TierId, Timestamp, ValidationError};

/// A normalized coupon code: trimmed, upper-cased, 3-50 chars of `A-Z0-9-_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 50;

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ValidationError::empty_field("coupon_code"));
        }

        let len = normalized.chars().count();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&len) {
            return Err(ValidationError::out_of_range(
                "coupon_code",
                Self::MIN_LEN as i64,
                Self::MAX_LEN as i64,
                len as i64,
            ));
        }

        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::invalid_format(
                "coupon_code",
                "letters, digits, '-' and '_' only",
            ));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CouponCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CouponCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How much a coupon takes off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    Percentage(Percentage),
    Fixed(Money),
}

impl Discount {
    pub fn kind(&self) -> &'static str {
        match self {
            Discount::Percentage(_) => "percentage",
            Discount::Fixed(_) => "fixed",
        }
    }
}

impl std::fmt::Display for Discount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discount::Percentage(p) => write!(f, "{} off", p),
            Discount::Fixed(m) => write!(f, "{} off", m),
        }
    }
}

/// Why a coupon cannot be redeemed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponInvalidReason {
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon is not yet valid")]
    NotYetValid,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit exceeded")]
    UsageLimitExceeded,
}

/// A discount code from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: CouponCode,
    pub name: String,
    pub description: String,
    pub discount: Discount,
    /// `None` (or zero) means uncapped.
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub minimum_amount: Option<Money>,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
    /// Empty means every tier.
    pub applicable_tiers: Vec<TierId>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl Coupon {
    fn usage_cap(&self) -> Option<u32> {
        self.max_uses.filter(|cap| *cap > 0)
    }

    /// Checks activity, the validity window and the usage cap, in that order.
    pub fn check_valid(&self, now: Timestamp) -> Result<(), CouponInvalidReason> {
        if !self.is_active {
            return Err(CouponInvalidReason::Inactive);
        }
        if let Some(from) = self.valid_from {
            if now.is_before(&from) {
                return Err(CouponInvalidReason::NotYetValid);
            }
        }
        if let Some(until) = self.valid_until {
            if now.is_after(&until) {
                return Err(CouponInvalidReason::Expired);
            }
        }
        if let Some(cap) = self.usage_cap() {
            if self.used_count >= cap {
                return Err(CouponInvalidReason::UsageLimitExceeded);
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.check_valid(now).is_ok()
    }

    /// Discount for `amount`; never more than `amount` and never negative.
    pub fn calculate_discount(&self, amount: Money) -> Money {
        let amount = amount.max(Money::ZERO);
        let raw = match self.discount {
            Discount::Percentage(pct) => amount.percent(pct),
            Discount::Fixed(value) => value.max(Money::ZERO).min(amount),
        };
        raw.min(amount)
    }

    pub fn can_apply_to_tier(&self, tier: &TierId) -> bool {
        self.applicable_tiers.is_empty() || self.applicable_tiers.contains(tier)
    }

    /// Minimum-purchase gate, applied before the discount is computed.
    pub fn meets_minimum(&self, amount: Money) -> bool {
        match self.minimum_amount {
            Some(min) => amount >= min,
            None => true,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn percentage_coupon(code: &str, pct: u8) -> Coupon {
        Coupon {
            id: CouponId::new(),
            code: CouponCode::parse(code).unwrap(),
            name: code.to_string(),
            description: format!("{}% off", pct),
            discount: Discount::Percentage(Percentage::new(pct)),
            max_uses: None,
            used_count: 0,
            minimum_amount: None,
            valid_from: None,
            valid_until: None,
            applicable_tiers: vec![],
            is_active: true,
            created_at: Timestamp::now(),
        }
    }

    pub fn fixed_coupon(code: &str, cents: i64) -> Coupon {
        Coupon {
            discount: Discount::Fixed(Money::from_cents(cents)),
            description: format!("{} off", Money::from_cents(cents)),
            ..percentage_coupon(code, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use proptest::prelude::*;

    // ════════════════════════════════════════════════════════════════
    // CouponCode
    // ════════════════════════════════════════════════════════════════

    #[test]
    fn code_is_trimmed_and_uppercased() {
        let code = CouponCode::parse("  welcome20 ").unwrap();
        assert_eq!(code.as_str(), "WELCOME20");
    }

    #[test]
    fn code_rejects_empty_and_short() {
        assert!(matches!(
            CouponCode::parse("   "),
            Err(ValidationError::EmptyField { .. })
        ));
        assert!(matches!(
            CouponCode::parse("ab"),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn code_rejects_symbols() {
        assert!(CouponCode::parse("SAVE 10").is_err());
        assert!(CouponCode::parse("SAVE$10").is_err());
        assert!(CouponCode::parse("SPRING-10_A").is_ok());
    }

    // ════════════════════════════════════════════════════════════════
    // Validity
    // ════════════════════════════════════════════════════════════════

    #[test]
    fn inactive_coupon_is_invalid() {
        let mut c = percentage_coupon("WELCOME20", 20);
        c.is_active = false;
        assert_eq!(c.check_valid(Timestamp::now()), Err(CouponInvalidReason::Inactive));
        assert_eq!(
            CouponInvalidReason::Inactive.to_string(),
            "Coupon is not active"
        );
    }

    #[test]
    fn coupon_before_window_is_not_yet_valid() {
        let now = Timestamp::now();
        let mut c = percentage_coupon("WELCOME20", 20);
        c.valid_from = Some(now.add_days(1));
        assert_eq!(c.check_valid(now), Err(CouponInvalidReason::NotYetValid));
    }

    #[test]
    fn coupon_after_window_is_expired() {
        let now = Timestamp::now();
        let mut c = percentage_coupon("WELCOME20", 20);
        c.valid_until = Some(now.minus_days(1));
        assert_eq!(c.check_valid(now), Err(CouponInvalidReason::Expired));
    }

    #[test]
    fn exhausted_coupon_is_invalid() {
        let mut c = percentage_coupon("WELCOME20", 20);
        c.max_uses = Some(3);
        c.used_count = 3;
        assert_eq!(
            c.check_valid(Timestamp::now()),
            Err(CouponInvalidReason::UsageLimitExceeded)
        );
    }

    #[test]
    fn zero_cap_means_uncapped() {
        let mut c = percentage_coupon("WELCOME20", 20);
        c.max_uses = Some(0);
        c.used_count = 40;
        assert!(c.is_valid(Timestamp::now()));
    }

    // ════════════════════════════════════════════════════════════════
    // Discount calculation
    // ════════════════════════════════════════════════════════════════

    #[test]
    fn percentage_discount_of_growth_tier() {
        let c = percentage_coupon("WELCOME20", 20);
        assert_eq!(c.calculate_discount(Money::from_dollars(25)), Money::from_dollars(5));
    }

    #[test]
    fn fixed_discount_is_capped_at_amount() {
        let c = fixed_coupon("BIGSAVE", 5_000);
        assert_eq!(c.calculate_discount(Money::from_dollars(30)), Money::from_dollars(30));
    }

    #[test]
    fn tier_allow_list_restricts_application() {
        let allowed = TierId::new();
        let mut c = percentage_coupon("WELCOME20", 20);
        assert!(c.can_apply_to_tier(&TierId::new()));
        c.applicable_tiers = vec![allowed];
        assert!(c.can_apply_to_tier(&allowed));
        assert!(!c.can_apply_to_tier(&TierId::new()));
    }

    #[test]
    fn minimum_amount_gate() {
        let mut c = fixed_coupon("SPRING10", 1_000);
        c.minimum_amount = Some(Money::from_dollars(100));
        assert!(c.meets_minimum(Money::from_dollars(100)));
        assert!(!c.meets_minimum(Money::from_dollars(50)));
    }

    proptest! {
        #[test]
        fn fixed_discount_is_min_of_value_and_amount(value in 0i64..1_000_000, amount in 0i64..1_000_000) {
            let c = fixed_coupon("PROP", value);
            let d = c.calculate_discount(Money::from_cents(amount));
            prop_assert_eq!(d, Money::from_cents(value.min(amount)));
            prop_assert!(!d.is_negative());
        }

        #[test]
        fn percentage_discount_never_exceeds_amount(pct in 0u8..=100, amount in 0i64..10_000_000) {
            let c = percentage_coupon("PROP", pct);
            let amount = Money::from_cents(amount);
            let d = c.calculate_discount(amount);
            prop_assert!(d <= amount);
            prop_assert!(!d.is_negative());
        }

        #[test]
        fn fractional_percentage_rounds_half_up_to_the_cent(bp in 0u16..=10_000, amount in 0i64..10_000_000) {
            let mut c = percentage_coupon("PROP", 0);
            c.discount = Discount::Percentage(Percentage::from_basis_points(bp));
            let d = c.calculate_discount(Money::from_cents(amount));
            let exact = i128::from(amount) * i128::from(bp);
            let expected = (exact + 5_000) / 10_000;
            prop_assert_eq!(i128::from(d.cents()), expected);
            prop_assert!(d <= Money::from_cents(amount));
        }
    }

    #[test]
    fn twelve_and_a_half_percent_off_growth() {
        let mut c = percentage_coupon("HALFTWELVE", 0);
        c.discount = Discount::Percentage(Percentage::from_basis_points(1_250));
        assert_eq!(c.calculate_discount(Money::from_cents(2_500)), Money::from_cents(313));
        assert_eq!(c.discount.to_string(), "12.5% off");
    }
}
