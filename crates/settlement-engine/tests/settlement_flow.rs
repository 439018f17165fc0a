//! End-to-end settlement flow: initiate → webhook → transfer →
//! commission, including duplicate webhook delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;

use settlement_core::{
    BillingPlan, MemoryDirectory, Money, Organization, OrganizationId, OrgType, PaymentStatus,
    PlanId, SplitType, TransferStatus,
};
use settlement_engine::{
    CommissionAggregator, Disposition, EngineConfig, GatewayEvent, MemorySettlementStore,
    MockGateway, Reconciler, SettlementOrchestrator, SettlementRequest, SettlementStore,
    TransferExecutor,
};

struct Platform {
    orchestrator: SettlementOrchestrator,
    reconciler: Reconciler,
    executor: TransferExecutor,
    aggregator: CommissionAggregator,
    store: Arc<MemorySettlementStore>,
    gateway: Arc<MockGateway>,
}

fn platform() -> Platform {
    let store = Arc::new(MemorySettlementStore::new());
    let gateway = Arc::new(MockGateway::new());
    let directory = Arc::new(MemoryDirectory::new());

    directory.add_org(Organization {
        id: OrganizationId::from_string("agency-1"),
        org_type: OrgType::Agency,
        parent_org: None,
        settlement_account_ref: Some("acct_agency_1".into()),
    });
    directory.add_org(Organization {
        id: OrganizationId::from_string("cust-1"),
        org_type: OrgType::EndCustomer,
        parent_org: Some(OrganizationId::from_string("agency-1")),
        settlement_account_ref: None,
    });
    directory.add_plan(BillingPlan {
        id: PlanId::from_string("plan-voice-pro"),
        created_by: OrganizationId::from_string("agency-1"),
        base_price: Money::new(dec!(100)),
        platform_fee_pct: dec!(30),
        agency_margin_pct: dec!(0),
    });

    let config = EngineConfig {
        max_transfer_attempts: 10,
        backoff_base: Duration::from_millis(0),
        backoff_cap: Duration::from_millis(0),
        poll_interval: Duration::from_millis(10),
    };

    Platform {
        orchestrator: SettlementOrchestrator::new(
            store.clone(),
            directory.clone(),
            gateway.clone(),
        ),
        reconciler: Reconciler::new(store.clone()),
        executor: TransferExecutor::new(store.clone(), directory, gateway.clone(), config),
        aggregator: CommissionAggregator::new(store.clone()),
        store,
        gateway,
    }
}

fn charge_succeeded(event_id: &str, txn: &str) -> GatewayEvent {
    GatewayEvent {
        event_id: event_id.into(),
        event_type: "charge.succeeded".into(),
        transaction_id: txn.into(),
        payload: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn hundred_dollar_agency_settlement_end_to_end() {
    let p = platform();

    // initiate: $100 charge, 30% platform fee, payer has an agency parent
    let payment = p
        .orchestrator
        .initiate_settlement(SettlementRequest {
            organization_id: OrganizationId::from_string("cust-1"),
            plan_id: PlanId::from_string("plan-voice-pro"),
            gross_amount: Money::new(dec!(100)),
            idempotency_key: "order-42".into(),
        })
        .await
        .unwrap();

    assert_eq!(payment.platform_amount, Money::new(dec!(30)));
    assert_eq!(payment.agency_amount, Money::new(dec!(70)));
    let txn = payment.external_txn_id.clone().unwrap();

    // gateway confirms asynchronously
    let disposition = p
        .reconciler
        .handle_event(&charge_succeeded("evt_1", &txn))
        .unwrap();
    assert_eq!(disposition, Disposition::Applied);

    let splits = p.store.splits_for_payment(payment.id).unwrap();
    let fee = splits
        .iter()
        .find(|s| s.split_type == SplitType::PlatformFee)
        .unwrap();
    let revenue = splits
        .iter()
        .find(|s| s.split_type == SplitType::AgencyRevenue)
        .unwrap();
    assert_eq!(fee.amount, Money::new(dec!(30)));
    assert_eq!(fee.transfer_status, TransferStatus::Completed);
    assert_eq!(revenue.amount, Money::new(dec!(70)));
    assert_eq!(revenue.transfer_status, TransferStatus::Processing);

    // background worker moves the agency share
    assert_eq!(p.executor.run_once().await.unwrap(), 1);
    let revenue = p.store.split(revenue.id).unwrap().unwrap();
    assert_eq!(revenue.transfer_status, TransferStatus::Completed);

    // exactly one commission row of $70.00
    let agency = OrganizationId::from_string("agency-1");
    let summary = p
        .aggregator
        .aggregate(
            &agency,
            Utc::now() - chrono::Duration::hours(1),
            Utc::now() + chrono::Duration::hours(1),
        )
        .unwrap();
    assert_eq!(summary.total_amount, Money::new(dec!(70)));
    assert_eq!(summary.commission_count, 1);

    let view = p.orchestrator.payment_status(payment.id).unwrap();
    assert_eq!(view.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn duplicate_webhook_delivery_has_no_duplicate_effects() {
    let p = platform();

    let payment = p
        .orchestrator
        .initiate_settlement(SettlementRequest {
            organization_id: OrganizationId::from_string("cust-1"),
            plan_id: PlanId::from_string("plan-voice-pro"),
            gross_amount: Money::new(dec!(100)),
            idempotency_key: "order-42".into(),
        })
        .await
        .unwrap();
    let txn = payment.external_txn_id.clone().unwrap();

    // same event delivered twice, and once more with a fresh event id
    assert_eq!(
        p.reconciler
            .handle_event(&charge_succeeded("evt_1", &txn))
            .unwrap(),
        Disposition::Applied
    );
    assert_eq!(
        p.reconciler
            .handle_event(&charge_succeeded("evt_1", &txn))
            .unwrap(),
        Disposition::Duplicate
    );
    assert_eq!(
        p.reconciler
            .handle_event(&charge_succeeded("evt_9", &txn))
            .unwrap(),
        Disposition::Ignored
    );

    // run the executor more than once; still a single transfer and
    // a single commission row
    p.executor.run_once().await.unwrap();
    p.executor.run_once().await.unwrap();
    assert_eq!(p.gateway.transfer_calls().len(), 1);

    let summary = p
        .aggregator
        .aggregate(
            &OrganizationId::from_string("agency-1"),
            Utc::now() - chrono::Duration::hours(1),
            Utc::now() + chrono::Duration::hours(1),
        )
        .unwrap();
    assert_eq!(summary.commission_count, 1);
    assert_eq!(summary.total_amount, Money::new(dec!(70)));
}
