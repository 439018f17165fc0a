//! Commission Aggregation
//!
//! Read-only derivation of per-agency commission totals from the
//! append-only commission rows. Safe to run repeatedly and
//! concurrently; never mutates payment or split state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use settlement_core::{CommissionStatus, Money, OrganizationId, Result};

use crate::store::SettlementStore;

/// Per-period commission totals for one agency
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommissionSummary {
    pub agency_org: OrganizationId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_amount: Money,
    pub commission_count: usize,
}

/// Derives commission reporting from completed splits
pub struct CommissionAggregator {
    store: Arc<dyn SettlementStore>,
}

impl CommissionAggregator {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    /// Total realized commission for an agency over a period.
    /// Cancelled rows are excluded.
    pub fn aggregate(
        &self,
        agency: &OrganizationId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<CommissionSummary> {
        let rows = self
            .store
            .commissions_for_agency(agency, period_start, period_end)?;

        let counted: Vec<_> = rows
            .iter()
            .filter(|c| c.status != CommissionStatus::Cancelled)
            .collect();

        Ok(CommissionSummary {
            agency_org: agency.clone(),
            period_start,
            period_end,
            total_amount: counted.iter().map(|c| c.amount).sum(),
            commission_count: counted.len(),
        })
    }

    /// Per-customer breakdown over the same rows
    pub fn aggregate_by_customer(
        &self,
        agency: &OrganizationId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<BTreeMap<OrganizationId, Money>> {
        let rows = self
            .store
            .commissions_for_agency(agency, period_start, period_end)?;

        let mut by_customer = BTreeMap::new();
        for commission in rows
            .iter()
            .filter(|c| c.status != CommissionStatus::Cancelled)
        {
            let entry = by_customer
                .entry(commission.customer_org.clone())
                .or_insert(Money::ZERO);
            *entry = *entry + commission.amount;
        }
        Ok(by_customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use settlement_core::Commission;

    use crate::store::MemorySettlementStore;

    fn commission(agency: &str, customer: &str, amount: Money) -> Commission {
        Commission {
            id: Uuid::new_v4(),
            agency_org: OrganizationId::from_string(agency),
            customer_org: OrganizationId::from_string(customer),
            payment_id: Uuid::new_v4(),
            amount,
            rate: dec!(70),
            status: CommissionStatus::Paid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_aggregate_sums_non_cancelled_rows() {
        let store = Arc::new(MemorySettlementStore::new());
        let agency = OrganizationId::from_string("agency-1");

        store
            .record_commission(Uuid::new_v4(), commission("agency-1", "cust-1", Money::new(dec!(70))))
            .unwrap();
        store
            .record_commission(Uuid::new_v4(), commission("agency-1", "cust-2", Money::new(dec!(35))))
            .unwrap();

        let mut cancelled = commission("agency-1", "cust-1", Money::new(dec!(10)));
        cancelled.status = CommissionStatus::Cancelled;
        store.record_commission(Uuid::new_v4(), cancelled).unwrap();

        // other agency's rows do not leak in
        store
            .record_commission(Uuid::new_v4(), commission("agency-2", "cust-3", Money::new(dec!(99))))
            .unwrap();

        let aggregator = CommissionAggregator::new(store);
        let from = Utc::now() - Duration::hours(1);
        let to = Utc::now() + Duration::hours(1);

        let summary = aggregator.aggregate(&agency, from, to).unwrap();
        assert_eq!(summary.total_amount, Money::new(dec!(105)));
        assert_eq!(summary.commission_count, 2);

        // idempotent: identical on re-run
        let again = aggregator.aggregate(&agency, from, to).unwrap();
        assert_eq!(again.total_amount, summary.total_amount);
    }

    #[test]
    fn test_aggregate_respects_period_bounds() {
        let store = Arc::new(MemorySettlementStore::new());
        let agency = OrganizationId::from_string("agency-1");

        let mut old = commission("agency-1", "cust-1", Money::new(dec!(70)));
        old.created_at = Utc::now() - Duration::days(45);
        store.record_commission(Uuid::new_v4(), old).unwrap();
        store
            .record_commission(Uuid::new_v4(), commission("agency-1", "cust-1", Money::new(dec!(30))))
            .unwrap();

        let aggregator = CommissionAggregator::new(store);
        let summary = aggregator
            .aggregate(
                &agency,
                Utc::now() - Duration::days(30),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();
        assert_eq!(summary.total_amount, Money::new(dec!(30)));
    }

    #[test]
    fn test_breakdown_groups_by_customer() {
        let store = Arc::new(MemorySettlementStore::new());
        let agency = OrganizationId::from_string("agency-1");

        store
            .record_commission(Uuid::new_v4(), commission("agency-1", "cust-1", Money::new(dec!(70))))
            .unwrap();
        store
            .record_commission(Uuid::new_v4(), commission("agency-1", "cust-1", Money::new(dec!(70))))
            .unwrap();
        store
            .record_commission(Uuid::new_v4(), commission("agency-1", "cust-2", Money::new(dec!(35))))
            .unwrap();

        let aggregator = CommissionAggregator::new(store);
        let breakdown = aggregator
            .aggregate_by_customer(
                &agency,
                Utc::now() - Duration::hours(1),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();

        assert_eq!(
            breakdown[&OrganizationId::from_string("cust-1")],
            Money::new(dec!(140))
        );
        assert_eq!(
            breakdown[&OrganizationId::from_string("cust-2")],
            Money::new(dec!(35))
        );
    }
}
