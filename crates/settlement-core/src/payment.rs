//! Settlement Records
//!
//! Payment, split, commission and subscription rows as the engine
//! persists them. Payments and their splits are created together in
//! one atomic write before any external call, so a crash between the
//! gateway call and persistence cannot lose the record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::OrganizationId;
use crate::money::Money;
use crate::plan::PlanId;
use crate::split::SplitAmounts;

/// Payment lifecycle status (payer-visible)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

/// A customer payment and its computed division
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,

    /// Paying organization
    pub organization_id: OrganizationId,

    /// Plan version this charge was priced against
    pub plan_id: PlanId,

    pub gross_amount: Money,
    pub platform_amount: Money,
    pub agency_amount: Money,

    pub status: PaymentStatus,

    /// Gateway transaction handle, unique; the webhook dedupe key.
    /// None until the gateway accepts the charge.
    pub external_txn_id: Option<String>,

    /// Client-supplied key detecting duplicate initiation requests
    pub idempotency_key: String,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Payment {
    /// Create a pending payment from computed split amounts.
    /// Invariant: `platform_amount + agency_amount == gross_amount`.
    pub fn new(
        organization_id: OrganizationId,
        plan_id: PlanId,
        gross_amount: Money,
        amounts: SplitAmounts,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            plan_id,
            gross_amount,
            platform_amount: amounts.platform,
            agency_amount: amounts.agency,
            status: PaymentStatus::Pending,
            external_txn_id: None,
            idempotency_key: idempotency_key.into(),
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }
}

/// What kind of share a split represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    PlatformFee,
    AgencyRevenue,
}

/// Who a split pays out to
///
/// The platform's fee never moves through an external transfer; it is
/// already resident in the operator's own balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "org")]
pub enum Beneficiary {
    Platform,
    Org(OrganizationId),
}

/// Transfer lifecycle for a single split
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

/// One beneficiary's share of one payment, tracked as its own
/// transferable unit. Never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub id: Uuid,
    pub payment_id: Uuid,

    /// Paying organization
    pub from_org: OrganizationId,
    pub to_org: Beneficiary,
    pub split_type: SplitType,

    pub amount: Money,

    /// The percentage this share was computed from
    pub percentage: Decimal,

    pub transfer_status: TransferStatus,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub transferred_at: Option<DateTime<Utc>>,

    /// Earliest time the transfer executor may pick this split up
    /// again. Scheduling-only backoff: nothing blocks on the wait.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl PaymentSplit {
    pub fn platform_fee(payment: &Payment, percentage: Decimal) -> Self {
        Self::new(
            payment,
            Beneficiary::Platform,
            SplitType::PlatformFee,
            payment.platform_amount,
            percentage,
        )
    }

    pub fn agency_revenue(payment: &Payment, agency: OrganizationId, percentage: Decimal) -> Self {
        Self::new(
            payment,
            Beneficiary::Org(agency),
            SplitType::AgencyRevenue,
            payment.agency_amount,
            percentage,
        )
    }

    fn new(
        payment: &Payment,
        to_org: Beneficiary,
        split_type: SplitType,
        amount: Money,
        percentage: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            from_org: payment.organization_id.clone(),
            to_org,
            split_type,
            amount,
            percentage,
            transfer_status: TransferStatus::Pending,
            retry_count: 0,
            failure_reason: None,
            transferred_at: None,
            next_attempt_at: None,
        }
    }
}

/// Commission payout lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Paid,
    Cancelled,
}

/// Realized agency revenue for one payment. Append-only; created
/// exactly once per completed agency split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub agency_org: OrganizationId,
    pub customer_org: OrganizationId,
    pub payment_id: Uuid,
    pub amount: Money,

    /// Effective rate the amount was derived from
    pub rate: Decimal,

    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    /// Build the commission row for a completed agency split
    pub fn for_completed_split(split: &PaymentSplit, agency: OrganizationId) -> Self {
        Self {
            id: Uuid::new_v4(),
            agency_org: agency,
            customer_org: split.from_org.clone(),
            payment_id: split.payment_id,
            amount: split.amount,
            rate: split.percentage,
            status: CommissionStatus::Paid,
            created_at: Utc::now(),
        }
    }
}

/// Subscription status mirrored from gateway lifecycle events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Cancelled,
}

/// A recurring subscription, independent of one-off payment rows
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub plan_id: PlanId,

    /// Gateway-side subscription handle
    pub external_sub_id: String,

    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator-queue entry for a webhook that referenced a payment we
/// never recorded. Always persisted, never just logged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub id: Uuid,
    pub event_id: String,
    pub external_txn_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl OperatorAlert {
    pub fn unknown_transaction(event_id: impl Into<String>, txn: impl Into<String>) -> Self {
        let external_txn_id = txn.into();
        Self {
            id: Uuid::new_v4(),
            event_id: event_id.into(),
            message: format!(
                "webhook references unknown transaction {external_txn_id}; possible lost settlement write"
            ),
            external_txn_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::split::compute_split;

    fn payment_with_agency() -> Payment {
        let gross = Money::new(dec!(100));
        let amounts = compute_split(gross, dec!(30), dec!(0), true).unwrap();
        Payment::new(
            OrganizationId::from_string("cust-1"),
            PlanId::from_string("plan-1"),
            gross,
            amounts,
            "idem-1",
        )
    }

    #[test]
    fn test_payment_preserves_sum_invariant() {
        let payment = payment_with_agency();
        assert_eq!(
            payment.platform_amount + payment.agency_amount,
            payment.gross_amount
        );
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_split_rows_carry_payment_amounts() {
        let payment = payment_with_agency();
        let fee = PaymentSplit::platform_fee(&payment, dec!(30));
        let revenue = PaymentSplit::agency_revenue(
            &payment,
            OrganizationId::from_string("agency-1"),
            dec!(70),
        );

        assert_eq!(fee.amount, Money::new(dec!(30)));
        assert_eq!(fee.to_org, Beneficiary::Platform);
        assert_eq!(revenue.amount, Money::new(dec!(70)));
        assert_eq!(revenue.transfer_status, TransferStatus::Pending);
        assert_eq!(revenue.payment_id, payment.id);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!TransferStatus::Processing.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
    }

    #[test]
    fn test_commission_from_split() {
        let payment = payment_with_agency();
        let agency = OrganizationId::from_string("agency-1");
        let split = PaymentSplit::agency_revenue(&payment, agency.clone(), dec!(70));

        let commission = Commission::for_completed_split(&split, agency.clone());
        assert_eq!(commission.agency_org, agency);
        assert_eq!(commission.customer_org, payment.organization_id);
        assert_eq!(commission.amount, Money::new(dec!(70)));
        assert_eq!(commission.status, CommissionStatus::Paid);
    }
}
