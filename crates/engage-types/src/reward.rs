use serde::{Deserialize, Serialize};
use std::fmt;

pub const MINOR_UNITS_PER_MAJOR: u64 = 100;

/// Monetary reward in minor currency units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RewardAmount(u64);

impl RewardAmount {
    pub const ZERO: Self = Self(0);
    /// Upper bound for a single task reward; anything larger is a
    /// configuration mistake, not a payout.
    pub const MAX_GRANT: Self = Self(1_000_000 * MINOR_UNITS_PER_MAJOR);

    pub fn from_minor_units(units: u64) -> Self {
        Self(units)
    }

    pub fn from_major(major: f64) -> Self {
        Self((major * MINOR_UNITS_PER_MAJOR as f64) as u64)
    }

    pub fn to_minor_units(&self) -> u64 {
        self.0
    }

    pub fn to_major(&self) -> f64 {
        self.0 as f64 / MINOR_UNITS_PER_MAJOR as f64
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RewardAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_major())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let amount = RewardAmount::from_major(12.5);
        assert_eq!(amount.to_minor_units(), 1250);
        assert_eq!(amount.to_major(), 12.5);
        assert_eq!(format!("{}", amount), "12.50");
    }

    #[test]
    fn test_arithmetic() {
        let a = RewardAmount::from_minor_units(100);
        let b = RewardAmount::from_minor_units(250);
        assert_eq!(a.checked_add(b), Some(RewardAmount::from_minor_units(350)));
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(a.saturating_sub(b), RewardAmount::ZERO);
    }
}
