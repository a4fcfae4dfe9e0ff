//! Money value object in integer minor units (US cents).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

use super::Percentage;

/// An amount of US dollars stored as whole cents.
///
/// Arithmetic saturates; amounts coming from the catalog are never negative
/// but a negative discount line is built from `Money` when talking to Stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole dollars to cents.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Decimal dollar value, used only for outbound JSON that expects it.
    pub fn as_dollars_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `self * pct / 100`, rounded half-up to the cent.
    pub fn percent(&self, pct: Percentage) -> Money {
        let scaled = i128::from(self.0) * i128::from(pct.basis_points());
        let rounded = if scaled >= 0 {
            (scaled + 5_000) / 10_000
        } else {
            (scaled - 5_000) / 10_000
        };
        Money(rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }

    /// Subtraction floored at zero.
    pub fn saturating_sub_floor_zero(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_dollars_and_cents() {
        assert_eq!(Money::from_cents(2500).to_string(), "$25.00");
        assert_eq!(Money::from_cents(1999).to_string(), "$19.99");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-500).to_string(), "-$5.00");
    }

    #[test]
    fn percent_of_round_amount_is_exact() {
        let base = Money::from_dollars(25);
        assert_eq!(base.percent(Percentage::new(20)), Money::from_cents(500));
    }

    #[test]
    fn percent_rounds_half_up() {
        // 15% of $0.10 = 1.5 cents
        assert_eq!(Money::from_cents(10).percent(Percentage::new(15)), Money::from_cents(2));
        // 15% of $0.09 = 1.35 cents
        assert_eq!(Money::from_cents(9).percent(Percentage::new(15)), Money::from_cents(1));
    }

    #[test]
    fn fractional_percent_rounds_half_up() {
        // 12.5% of $25.00
        assert_eq!(
            Money::from_cents(2_500).percent(Percentage::from_basis_points(1_250)),
            Money::from_cents(313)
        );
        // 12.5% of $0.99 = 12.375 cents
        assert_eq!(
            Money::from_cents(99).percent(Percentage::from_basis_points(1_250)),
            Money::from_cents(12)
        );
    }

    #[test]
    fn full_percentage_returns_whole_amount() {
        let base = Money::from_cents(12_345);
        assert_eq!(base.percent(Percentage::HUNDRED), base);
        assert_eq!(base.percent(Percentage::ZERO), Money::ZERO);
    }

    #[test]
    fn floor_subtraction_never_goes_negative() {
        let r = Money::from_cents(500).saturating_sub_floor_zero(Money::from_cents(900));
        assert_eq!(r, Money::ZERO);
    }

    #[test]
    fn dollars_f64_conversion() {
        assert!((Money::from_cents(2000).as_dollars_f64() - 20.0).abs() < f64::EPSILON);
    }
}
