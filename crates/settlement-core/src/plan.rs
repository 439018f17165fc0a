//! Billing Plans
//!
//! A plan is immutable once referenced by a completed payment; price
//! changes create new plan rows rather than mutating existing ones.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::directory::OrganizationId;
use crate::money::Money;

/// Billing plan identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(String);

impl PlanId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A billing plan version
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingPlan {
    pub id: PlanId,

    /// Organization that defined this plan (platform or agency)
    pub created_by: OrganizationId,

    /// Base price before any agency surcharge
    pub base_price: Money,

    /// Platform's cut of the gross amount, 0-100
    pub platform_fee_pct: Decimal,

    /// Additive surcharge an agency may stack on a platform base plan, 0-100
    pub agency_margin_pct: Decimal,
}

impl BillingPlan {
    /// Customer-facing price: base price plus the agency margin
    pub fn effective_price(&self) -> Money {
        let factor = Decimal::ONE + self.agency_margin_pct / Decimal::from(100);
        Money::new(self.base_price.amount() * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_effective_price_applies_margin() {
        let plan = BillingPlan {
            id: PlanId::from_string("plan-1"),
            created_by: OrganizationId::from_string("agency-1"),
            base_price: Money::new(dec!(80)),
            platform_fee_pct: dec!(30),
            agency_margin_pct: dec!(25),
        };
        assert_eq!(plan.effective_price(), Money::new(dec!(100)));
    }

    #[test]
    fn test_zero_margin_keeps_base_price() {
        let plan = BillingPlan {
            id: PlanId::from_string("plan-1"),
            created_by: OrganizationId::from_string("platform"),
            base_price: Money::new(dec!(49.99)),
            platform_fee_pct: dec!(100),
            agency_margin_pct: dec!(0),
        };
        assert_eq!(plan.effective_price(), Money::new(dec!(49.99)));
    }
}
