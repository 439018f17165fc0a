//! Money Type
//!
//! Thin wrapper over `rust_decimal::Decimal` normalized to the
//! currency minor unit (cents). Never use f64 for money.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::ops::{Add, Sub};

/// Number of decimal places in the currency minor unit (USD cents)
pub const MINOR_UNIT: u32 = 2;

/// A monetary amount, exact to the currency minor unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

// Deserialization routes through `Money::new` so sub-cent wire
// amounts normalize at the boundary instead of flowing through raw.
impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        <Decimal as Deserialize>::deserialize(deserializer).map(Money::new)
    }
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Construct from a raw decimal, rounding half-up to the minor unit
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(MINOR_UNIT, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Construct from an amount in minor units (e.g. cents)
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, MINOR_UNIT))
    }

    /// The underlying decimal value
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount expressed in minor units
    pub fn minor_units(&self) -> i64 {
        (self.0 * Decimal::from(10i64.pow(MINOR_UNIT)))
            .round()
            .try_into()
            .unwrap_or(i64::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_unit_rounding() {
        assert_eq!(Money::new(dec!(10.005)), Money::from_minor(1001));
        assert_eq!(Money::new(dec!(10.004)), Money::from_minor(1000));
    }

    #[test]
    fn test_arithmetic_is_exact() {
        let gross = Money::from_minor(1);
        let platform = Money::new(gross.amount() * dec!(33) / dec!(100));
        let agency = gross - platform;
        assert_eq!(platform + agency, gross);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(12345).to_string(), "$123.45");
        assert_eq!(Money::from_minor(5).to_string(), "$0.05");
    }

    #[test]
    fn test_minor_units_roundtrip() {
        assert_eq!(Money::from_minor(9999).minor_units(), 9999);
        assert_eq!(Money::ZERO.minor_units(), 0);
    }

    #[test]
    fn test_deserialize_normalizes_sub_cent_amounts() {
        let money: Money = serde_json::from_str(r#""100.005""#).unwrap();
        assert_eq!(money, Money::from_minor(10001));

        let money: Money = serde_json::from_str(r#""99.994""#).unwrap();
        assert_eq!(money, Money::from_minor(9999));
    }
}
