//! Split Calculator
//!
//! Pure computation of how a gross payment divides between the
//! platform operator and the reselling agency.
//!
//! The platform share is rounded half-up to the currency minor unit;
//! the agency share is the exact remainder. Two independent roundings
//! could create or destroy a cent under sub-cent pressure, so the
//! remainder method is the load-bearing rule here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};
use crate::money::Money;

/// Beneficiary amounts for a single payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAmounts {
    pub platform: Money,
    pub agency: Money,
}

/// Compute the platform/agency division of a gross amount.
///
/// With no agency parent the entire gross amount belongs to the
/// platform and no agency share exists.
pub fn compute_split(
    gross: Money,
    platform_fee_pct: Decimal,
    agency_margin_pct: Decimal,
    has_agency_parent: bool,
) -> Result<SplitAmounts> {
    validate_percentage("platform_fee_pct", platform_fee_pct)?;
    validate_percentage("agency_margin_pct", agency_margin_pct)?;

    if gross.is_negative() {
        return Err(SettlementError::InvalidFeeConfiguration(format!(
            "gross amount must not be negative, got {gross}"
        )));
    }

    if !has_agency_parent {
        return Ok(SplitAmounts {
            platform: gross,
            agency: Money::ZERO,
        });
    }

    let platform = Money::new(gross.amount() * platform_fee_pct / Decimal::from(100));
    let agency = gross - platform;

    if agency.is_negative() {
        return Err(SettlementError::InvalidFeeConfiguration(format!(
            "fee configuration yields negative agency share ({agency}) for gross {gross}"
        )));
    }

    Ok(SplitAmounts { platform, agency })
}

fn validate_percentage(name: &str, pct: Decimal) -> Result<()> {
    if pct < Decimal::ZERO || pct > Decimal::from(100) {
        return Err(SettlementError::InvalidFeeConfiguration(format!(
            "{name} must be within [0, 100], got {pct}"
        )));
    }
    Ok(())
}
