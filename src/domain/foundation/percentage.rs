//! Percentage value object (0-100 scale, two decimal places).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

const BASIS_POINTS_PER_PERCENT: u16 = 100;
const MAX_BASIS_POINTS: u16 = 10_000;

/// A percentage between 0 and 100 inclusive, held in basis points so that
/// values like 12.5% are exact. Serialized as a decimal percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Percentage(u16);

impl Percentage {
    pub const ZERO: Self = Self(0);
    pub const HUNDRED: Self = Self(MAX_BASIS_POINTS);

    /// A whole percent, clamped to 100.
    pub fn new(whole: u8) -> Self {
        Self::from_basis_points(u16::from(whole) * BASIS_POINTS_PER_PERCENT)
    }

    /// Hundredths of a percent (1250 is 12.5%), clamped to 100%.
    pub fn from_basis_points(bp: u16) -> Self {
        Self(bp.min(MAX_BASIS_POINTS))
    }

    /// Basis points from storage, rejecting anything outside 0..=10000.
    pub fn try_from_basis_points(bp: i64) -> Result<Self, ValidationError> {
        match u16::try_from(bp) {
            Ok(v) if v <= MAX_BASIS_POINTS => Ok(Self(v)),
            _ => Err(ValidationError::out_of_range(
                "percentage",
                0,
                i64::from(MAX_BASIS_POINTS),
                bp,
            )),
        }
    }

    pub fn basis_points(&self) -> u16 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / f64::from(BASIS_POINTS_PER_PERCENT)
    }
}

impl TryFrom<f64> for Percentage {
    type Error = ValidationError;

    /// Rounds to the nearest hundredth of a percent.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let bp = (value * f64::from(BASIS_POINTS_PER_PERCENT)).round();
        if !bp.is_finite() || bp < 0.0 || bp > f64::from(MAX_BASIS_POINTS) {
            return Err(ValidationError::out_of_range(
                "percentage",
                0,
                100,
                value as i64,
            ));
        }
        Ok(Self(bp as u16))
    }
}

impl From<Percentage> for f64 {
    fn from(p: Percentage) -> Self {
        p.as_f64()
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / BASIS_POINTS_PER_PERCENT;
        let frac = self.0 % BASIS_POINTS_PER_PERCENT;
        match frac {
            0 => write!(f, "{}%", whole),
            f10 if f10 % 10 == 0 => write!(f, "{}.{}%", whole, f10 / 10),
            _ => write!(f, "{}.{:02}%", whole, frac),
        }
    }
}
