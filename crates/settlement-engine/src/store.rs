//! Settlement Storage
//!
//! Storage abstraction for payments, splits, commissions,
//! subscriptions, the processed-webhook audit table and the operator
//! alert queue. The trait assumes the backing store offers atomic
//! multi-row writes; the in-memory implementation gets that from a
//! single `RwLock` over all tables.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use settlement_core::{
    Commission, OperatorAlert, OrganizationId, Payment, PaymentSplit, PaymentStatus, Result,
    SettlementError, SplitType, Subscription, TransferStatus,
};

/// Settlement storage trait
pub trait SettlementStore: Send + Sync {
    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    /// Insert a payment and all of its splits in one atomic write.
    ///
    /// A colliding idempotency key fails with
    /// [`SettlementError::DuplicateRequest`] carrying the existing
    /// payment id; the caller treats that as "already exists", not as
    /// an error to surface.
    fn insert_payment(&self, payment: &Payment, splits: &[PaymentSplit]) -> Result<()>;

    fn payment(&self, id: Uuid) -> Result<Option<Payment>>;

    fn payment_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>>;

    fn payment_by_external_txn(&self, txn: &str) -> Result<Option<Payment>>;

    /// Record the gateway's transaction handle after the charge call.
    /// The handle is unique; a second payment claiming it is rejected.
    fn set_external_txn(&self, payment_id: Uuid, txn: &str) -> Result<()>;

    /// pending → completed. Returns false if the payment was already
    /// terminal (duplicate or late event).
    fn complete_payment(&self, payment_id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// pending → failed. Returns false if already terminal.
    fn fail_payment(&self, payment_id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<bool>;

    // ------------------------------------------------------------------
    // Splits
    // ------------------------------------------------------------------

    fn split(&self, split_id: Uuid) -> Result<Option<PaymentSplit>>;

    fn splits_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentSplit>>;

    /// On payment completion: platform splits complete immediately
    /// (the fee is already in the operator's balance), agency splits
    /// move to processing and become due for transfer.
    fn promote_splits(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Mark pending splits failed after a synchronous charge failure
    fn fail_pending_splits(&self, payment_id: Uuid, reason: &str) -> Result<()>;

    /// Processing splits whose `next_attempt_at` has passed and that
    /// no worker currently holds
    fn due_transfers(&self, now: DateTime<Utc>) -> Result<Vec<PaymentSplit>>;

    /// Check-and-set claim for transfer execution. True exactly once
    /// per in-flight attempt: a second worker racing on the same
    /// split gets false.
    fn claim_transfer(&self, split_id: Uuid) -> Result<bool>;

    /// Release a claim after a transient failure or hold, recording
    /// bookkeeping and the next scheduled attempt
    fn release_transfer(
        &self,
        split_id: Uuid,
        retry_count: u32,
        failure_reason: Option<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    /// processing → completed
    fn complete_transfer(&self, split_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// processing → failed, terminal; manual remediation from here
    fn fail_transfer(&self, split_id: Uuid, retry_count: u32, reason: &str) -> Result<()>;

    /// Terminally failed splits, for the operator surface
    fn failed_splits(&self) -> Result<Vec<PaymentSplit>>;

    // ------------------------------------------------------------------
    // Commissions
    // ------------------------------------------------------------------

    /// Record the commission for a completed split. Idempotent:
    /// returns false without writing if one already exists.
    fn record_commission(&self, split_id: Uuid, commission: Commission) -> Result<bool>;

    fn commissions_for_agency(
        &self,
        agency: &OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Commission>>;

    // ------------------------------------------------------------------
    // Webhook audit & subscriptions
    // ------------------------------------------------------------------

    /// Whether a webhook event id has already been fully processed
    fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    /// Check-and-record a webhook event id. Called only after the
    /// event's transition has landed, so a failed application leaves
    /// the event unrecorded and redeliverable. False means another
    /// delivery recorded it first.
    fn record_event(&self, event_id: &str) -> Result<bool>;

    fn upsert_subscription(&self, subscription: Subscription) -> Result<()>;

    fn subscription_by_external(&self, external_sub_id: &str) -> Result<Option<Subscription>>;

    // ------------------------------------------------------------------
    // Operator queue
    // ------------------------------------------------------------------

    fn push_alert(&self, alert: OperatorAlert) -> Result<()>;

    fn alerts(&self) -> Result<Vec<OperatorAlert>>;
}

#[derive(Default)]
struct Inner {
    payments: HashMap<Uuid, Payment>,
    by_idempotency: HashMap<String, Uuid>,
    by_external_txn: HashMap<String, Uuid>,

    splits: HashMap<Uuid, PaymentSplit>,
    splits_by_payment: HashMap<Uuid, Vec<Uuid>>,
    /// Splits a worker currently holds a transfer claim on
    in_flight: HashSet<Uuid>,

    commissions: HashMap<Uuid, Commission>,
    commission_by_split: HashMap<Uuid, Uuid>,

    processed_events: HashSet<String>,
    subscriptions: HashMap<String, Subscription>,
    alerts: Vec<OperatorAlert>,
}

/// In-memory settlement store (reference implementation and test
/// double; production deployments put a relational store behind the
/// same trait)
#[derive(Default)]
pub struct MemorySettlementStore {
    inner: RwLock<Inner>,
}

impl MemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettlementStore for MemorySettlementStore {
    fn insert_payment(&self, payment: &Payment, splits: &[PaymentSplit]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        if let Some(existing) = inner.by_idempotency.get(&payment.idempotency_key) {
            return Err(SettlementError::DuplicateRequest {
                payment_id: *existing,
            });
        }

        inner
            .by_idempotency
            .insert(payment.idempotency_key.clone(), payment.id);
        inner.payments.insert(payment.id, payment.clone());

        let ids: Vec<Uuid> = splits.iter().map(|s| s.id).collect();
        for split in splits {
            inner.splits.insert(split.id, split.clone());
        }
        inner.splits_by_payment.insert(payment.id, ids);

        Ok(())
    }

    fn payment(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.inner.read().unwrap().payments.get(&id).cloned())
    }

    fn payment_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .by_idempotency
            .get(key)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    fn payment_by_external_txn(&self, txn: &str) -> Result<Option<Payment>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .by_external_txn
            .get(txn)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    fn set_external_txn(&self, payment_id: Uuid, txn: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        if let Some(existing) = inner.by_external_txn.get(txn) {
            if *existing != payment_id {
                return Err(SettlementError::Storage(format!(
                    "external transaction {txn} already recorded for another payment"
                )));
            }
            return Ok(());
        }

        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| SettlementError::NotFound(format!("payment {payment_id}")))?;
        payment.external_txn_id = Some(txn.to_string());
        inner.by_external_txn.insert(txn.to_string(), payment_id);
        Ok(())
    }

    fn complete_payment(&self, payment_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| SettlementError::NotFound(format!("payment {payment_id}")))?;

        if payment.status.is_terminal() {
            return Ok(false);
        }
        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(at);
        Ok(true)
    }

    fn fail_payment(&self, payment_id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| SettlementError::NotFound(format!("payment {payment_id}")))?;

        if payment.status.is_terminal() {
            return Ok(false);
        }
        payment.status = PaymentStatus::Failed;
        payment.failed_at = Some(at);
        payment.failure_reason = Some(reason.to_string());
        Ok(true)
    }

    fn split(&self, split_id: Uuid) -> Result<Option<PaymentSplit>> {
        Ok(self.inner.read().unwrap().splits.get(&split_id).cloned())
    }

    fn splits_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentSplit>> {
        let inner = self.inner.read().unwrap();
        let ids = inner
            .splits_by_payment
            .get(&payment_id)
            .cloned()
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.splits.get(id))
            .cloned()
            .collect())
    }

    fn promote_splits(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let ids = inner
            .splits_by_payment
            .get(&payment_id)
            .cloned()
            .unwrap_or_default();

        for id in ids {
            if let Some(split) = inner.splits.get_mut(&id) {
                if split.transfer_status != TransferStatus::Pending {
                    continue;
                }
                match split.split_type {
                    SplitType::PlatformFee => {
                        split.transfer_status = TransferStatus::Completed;
                        split.transferred_at = Some(now);
                    }
                    SplitType::AgencyRevenue => {
                        split.transfer_status = TransferStatus::Processing;
                        split.next_attempt_at = Some(now);
                    }
                }
            }
        }
        Ok(())
    }

    fn fail_pending_splits(&self, payment_id: Uuid, reason: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let ids = inner
            .splits_by_payment
            .get(&payment_id)
            .cloned()
            .unwrap_or_default();

        for id in ids {
            if let Some(split) = inner.splits.get_mut(&id) {
                if split.transfer_status == TransferStatus::Pending {
                    split.transfer_status = TransferStatus::Failed;
                    split.failure_reason = Some(reason.to_string());
                }
            }
        }
        Ok(())
    }

    fn due_transfers(&self, now: DateTime<Utc>) -> Result<Vec<PaymentSplit>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .splits
            .values()
            .filter(|s| {
                s.transfer_status == TransferStatus::Processing
                    && !inner.in_flight.contains(&s.id)
                    && s.next_attempt_at.map_or(true, |at| at <= now)
            })
            .cloned()
            .collect())
    }

    fn claim_transfer(&self, split_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let claimable = inner
            .splits
            .get(&split_id)
            .map_or(false, |s| s.transfer_status == TransferStatus::Processing);

        if !claimable || inner.in_flight.contains(&split_id) {
            return Ok(false);
        }
        inner.in_flight.insert(split_id);
        Ok(true)
    }

    fn release_transfer(
        &self,
        split_id: Uuid,
        retry_count: u32,
        failure_reason: Option<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.in_flight.remove(&split_id);
        let split = inner
            .splits
            .get_mut(&split_id)
            .ok_or_else(|| SettlementError::NotFound(format!("split {split_id}")))?;
        split.retry_count = retry_count;
        if failure_reason.is_some() {
            split.failure_reason = failure_reason;
        }
        split.next_attempt_at = Some(next_attempt_at);
        Ok(())
    }

    fn complete_transfer(&self, split_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.in_flight.remove(&split_id);
        let split = inner
            .splits
            .get_mut(&split_id)
            .ok_or_else(|| SettlementError::NotFound(format!("split {split_id}")))?;
        split.transfer_status = TransferStatus::Completed;
        split.transferred_at = Some(at);
        split.next_attempt_at = None;
        Ok(())
    }

    fn fail_transfer(&self, split_id: Uuid, retry_count: u32, reason: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.in_flight.remove(&split_id);
        let split = inner
            .splits
            .get_mut(&split_id)
            .ok_or_else(|| SettlementError::NotFound(format!("split {split_id}")))?;
        split.transfer_status = TransferStatus::Failed;
        split.retry_count = retry_count;
        split.failure_reason = Some(reason.to_string());
        split.next_attempt_at = None;
        Ok(())
    }

    fn failed_splits(&self) -> Result<Vec<PaymentSplit>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .splits
            .values()
            .filter(|s| s.transfer_status == TransferStatus::Failed)
            .cloned()
            .collect())
    }

    fn record_commission(&self, split_id: Uuid, commission: Commission) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        if inner.commission_by_split.contains_key(&split_id) {
            return Ok(false);
        }
        inner.commission_by_split.insert(split_id, commission.id);
        inner.commissions.insert(commission.id, commission);
        Ok(true)
    }

    fn commissions_for_agency(
        &self,
        agency: &OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Commission>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .commissions
            .values()
            .filter(|c| c.agency_org == *agency && c.created_at >= from && c.created_at < to)
            .cloned()
            .collect())
    }

    fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .processed_events
            .contains(event_id))
    }

    fn record_event(&self, event_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.processed_events.insert(event_id.to_string()))
    }

    fn upsert_subscription(&self, subscription: Subscription) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .subscriptions
            .insert(subscription.external_sub_id.clone(), subscription);
        Ok(())
    }

    fn subscription_by_external(&self, external_sub_id: &str) -> Result<Option<Subscription>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.subscriptions.get(external_sub_id).cloned())
    }

    fn push_alert(&self, alert: OperatorAlert) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.alerts.push(alert);
        Ok(())
    }

    fn alerts(&self) -> Result<Vec<OperatorAlert>> {
        Ok(self.inner.read().unwrap().alerts.clone())
    }
}
