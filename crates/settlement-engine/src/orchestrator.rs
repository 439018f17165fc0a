//! Settlement Orchestrator
//!
//! Entry point for charging a customer. The payment and its splits
//! are persisted atomically, in `pending`, before the gateway is
//! contacted; the gateway's transaction handle is written back in a
//! follow-up update. No network call ever runs inside the storage
//! write, so a crash between the two leaves a pending record rather
//! than a lost one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use settlement_core::{
    compute_split, Money, OrganizationDirectory, OrganizationId, Payment, PaymentSplit,
    PaymentStatus, PlanId, Result, SettlementError,
};

use crate::gateway::PaymentGateway;
use crate::store::SettlementStore;

/// Request to settle a charge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub organization_id: OrganizationId,
    pub plan_id: PlanId,
    pub gross_amount: Money,

    /// Client-supplied token; re-submitting the same logical request
    /// returns the existing payment instead of creating a second one
    pub idempotency_key: String,
}

/// Payer-visible payment state. Split and transfer detail stays
/// internal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentStatusView {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub gross_amount: Money,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl From<&Payment> for PaymentStatusView {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            status: payment.status,
            gross_amount: payment.gross_amount,
            completed_at: payment.completed_at,
            failed_at: payment.failed_at,
        }
    }
}

/// Creates payment records and issues gateway charges
pub struct SettlementOrchestrator {
    store: Arc<dyn SettlementStore>,
    directory: Arc<dyn OrganizationDirectory>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SettlementOrchestrator {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        directory: Arc<dyn OrganizationDirectory>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
        }
    }

    /// Initiate settlement of a charge.
    ///
    /// Returns the existing payment when the idempotency key has been
    /// seen before. A synchronous charge failure (network error,
    /// declined card) moves the payment and its splits straight to
    /// `failed`; nothing will ever transfer for it.
    pub async fn initiate_settlement(&self, request: SettlementRequest) -> Result<Payment> {
        if let Some(existing) = self
            .store
            .payment_by_idempotency_key(&request.idempotency_key)?
        {
            tracing::info!(
                payment_id = %existing.id,
                idempotency_key = %request.idempotency_key,
                "Duplicate settlement request, returning existing payment"
            );
            return Ok(existing);
        }

        let plan = self.directory.plan(&request.plan_id).await?;
        let agency = self
            .directory
            .resolve_parent_agency(&request.organization_id)
            .await?;

        let amounts = compute_split(
            request.gross_amount,
            plan.platform_fee_pct,
            plan.agency_margin_pct,
            agency.is_some(),
        )?;

        let payment = Payment::new(
            request.organization_id.clone(),
            request.plan_id.clone(),
            request.gross_amount,
            amounts,
            request.idempotency_key.clone(),
        );

        let mut splits = vec![PaymentSplit::platform_fee(&payment, plan.platform_fee_pct)];
        if let Some(agency_id) = agency {
            let agency_pct = rust_decimal::Decimal::from(100) - plan.platform_fee_pct;
            splits.push(PaymentSplit::agency_revenue(&payment, agency_id, agency_pct));
        }

        // Atomic local write first; the charge call comes after.
        match self.store.insert_payment(&payment, &splits) {
            Ok(()) => {}
            Err(SettlementError::DuplicateRequest { payment_id }) => {
                // Lost an insert race with a concurrent identical request
                return self
                    .store
                    .payment(payment_id)?
                    .ok_or_else(|| SettlementError::NotFound(format!("payment {payment_id}")));
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            payment_id = %payment.id,
            organization = %payment.organization_id,
            gross = %payment.gross_amount,
            platform = %payment.platform_amount,
            agency = %payment.agency_amount,
            "Created pending payment"
        );

        match self
            .gateway
            .charge(request.gross_amount, &request.idempotency_key)
            .await
        {
            Ok(handle) => {
                self.store
                    .set_external_txn(payment.id, &handle.transaction_id)?;
                tracing::info!(
                    payment_id = %payment.id,
                    transaction_id = %handle.transaction_id,
                    gateway = %self.gateway.name(),
                    "Gateway accepted charge"
                );
            }
            Err(e) => {
                let reason = e.to_string();
                self.store.fail_payment(payment.id, &reason, Utc::now())?;
                self.store.fail_pending_splits(payment.id, &reason)?;
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %reason,
                    "Charge failed synchronously, payment marked failed"
                );
                return Err(e);
            }
        }

        self.store
            .payment(payment.id)?
            .ok_or_else(|| SettlementError::NotFound(format!("payment {}", payment.id)))
    }

    /// Payer-facing status lookup
    pub fn payment_status(&self, payment_id: Uuid) -> Result<PaymentStatusView> {
        let payment = self
            .store
            .payment(payment_id)?
            .ok_or_else(|| SettlementError::NotFound(format!("payment {payment_id}")))?;
        Ok(PaymentStatusView::from(&payment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use settlement_core::{BillingPlan, MemoryDirectory, Organization, OrgType, TransferStatus};

    use crate::gateway::{MockFailure, MockGateway};
    use crate::store::MemorySettlementStore;

    fn directory() -> Arc<MemoryDirectory> {
        let dir = MemoryDirectory::new();
        dir.add_org(Organization {
            id: OrganizationId::from_string("agency-1"),
            org_type: OrgType::Agency,
            parent_org: None,
            settlement_account_ref: Some("acct_agency_1".into()),
        });
        dir.add_org(Organization {
            id: OrganizationId::from_string("cust-1"),
            org_type: OrgType::EndCustomer,
            parent_org: Some(OrganizationId::from_string("agency-1")),
            settlement_account_ref: None,
        });
        dir.add_org(Organization {
            id: OrganizationId::from_string("cust-direct"),
            org_type: OrgType::EndCustomer,
            parent_org: None,
            settlement_account_ref: None,
        });
        dir.add_plan(BillingPlan {
            id: PlanId::from_string("plan-1"),
            created_by: OrganizationId::from_string("agency-1"),
            base_price: Money::new(dec!(100)),
            platform_fee_pct: dec!(30),
            agency_margin_pct: dec!(0),
        });
        Arc::new(dir)
    }

    fn orchestrator() -> (
        SettlementOrchestrator,
        Arc<MemorySettlementStore>,
        Arc<MockGateway>,
    ) {
        let store = Arc::new(MemorySettlementStore::new());
        let gateway = Arc::new(MockGateway::new());
        let orchestrator =
            SettlementOrchestrator::new(store.clone(), directory(), gateway.clone());
        (orchestrator, store, gateway)
    }

    fn request(org: &str, key: &str) -> SettlementRequest {
        SettlementRequest {
            organization_id: OrganizationId::from_string(org),
            plan_id: PlanId::from_string("plan-1"),
            gross_amount: Money::new(dec!(100)),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_initiate_creates_payment_and_splits() {
        let (orchestrator, store, gateway) = orchestrator();
        let payment = orchestrator
            .initiate_settlement(request("cust-1", "idem-1"))
            .await
            .unwrap();

        assert_eq!(payment.platform_amount, Money::new(dec!(30)));
        assert_eq!(payment.agency_amount, Money::new(dec!(70)));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.external_txn_id.is_some());

        let splits = store.splits_for_payment(payment.id).unwrap();
        assert_eq!(splits.len(), 2);
        assert!(splits
            .iter()
            .all(|s| s.transfer_status == TransferStatus::Pending));

        // charge carried the same idempotency key
        let charges = gateway.charge_calls();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].idempotency_key, "idem-1");
    }

    #[tokio::test]
    async fn test_direct_customer_gets_single_platform_split() {
        let (orchestrator, store, _) = orchestrator();
        let payment = orchestrator
            .initiate_settlement(request("cust-direct", "idem-1"))
            .await
            .unwrap();

        assert_eq!(payment.platform_amount, Money::new(dec!(100)));
        assert_eq!(payment.agency_amount, Money::ZERO);
        assert_eq!(store.splits_for_payment(payment.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_returns_existing() {
        let (orchestrator, _, gateway) = orchestrator();
        let first = orchestrator
            .initiate_settlement(request("cust-1", "idem-1"))
            .await
            .unwrap();
        let second = orchestrator
            .initiate_settlement(request("cust-1", "idem-1"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(gateway.charge_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_synchronous_charge_failure_fails_payment() {
        let (orchestrator, store, gateway) = orchestrator();
        gateway.fail_charges(MockFailure::Permanent);

        let err = orchestrator
            .initiate_settlement(request("cust-1", "idem-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::GatewayPermanent(_)));

        let payment = store.payment_by_idempotency_key("idem-1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.failure_reason.is_some());
        assert!(store
            .splits_for_payment(payment.id)
            .unwrap()
            .iter()
            .all(|s| s.transfer_status == TransferStatus::Failed));
    }

    #[tokio::test]
    async fn test_payment_status_is_payer_visible_only() {
        let (orchestrator, _, _) = orchestrator();
        let payment = orchestrator
            .initiate_settlement(request("cust-1", "idem-1"))
            .await
            .unwrap();

        let view = orchestrator.payment_status(payment.id).unwrap();
        assert_eq!(view.payment_id, payment.id);
        assert_eq!(view.status, PaymentStatus::Pending);

        // the view is the payer-facing wire shape; internal fields
        // must not leak through it
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("idempotency_key").is_none());
        assert!(json.get("platform_amount").is_none());
        assert!(json.get("agency_amount").is_none());
        assert!(json.get("external_txn_id").is_none());
    }
}
