//! Webhook Reconciliation
//!
//! Consumes signed gateway events, deduplicates them, and advances
//! payment and subscription state. The gateway delivers at least
//! once and in any order, so every mutation sits behind the event-id
//! dedupe gate plus a terminal-state check. Handling stays fast:
//! transfers are deferred to the background executor, never run
//! inline here.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

use settlement_core::{
    OperatorAlert, OrganizationId, PlanId, Result, SettlementError, Subscription,
    SubscriptionStatus,
};

use crate::store::SettlementStore;

/// Header carrying the hex-encoded HMAC-SHA256 of the raw body
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook signature before trusting the payload
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let expected = hex::decode(signature)
        .map_err(|_| SettlementError::WebhookSignature("signature is not valid hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SettlementError::WebhookSignature(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SettlementError::WebhookSignature("signature mismatch".into()))
}

/// Compute the signature for a body (test and client helper)
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// A gateway event as delivered over the webhook
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Unique event id; the dedupe key
    pub event_id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Gateway transaction (or subscription) handle this event refers to
    pub transaction_id: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl GatewayEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| SettlementError::WebhookParse(e.to_string()))
    }

    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "charge.succeeded" => EventKind::ChargeSucceeded,
            "charge.failed" => EventKind::ChargeFailed,
            "subscription.renewed" => EventKind::SubscriptionRenewed,
            "subscription.cancelled" => EventKind::SubscriptionCancelled,
            _ => EventKind::Other,
        }
    }
}

/// Recognized event types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    ChargeSucceeded,
    ChargeFailed,
    SubscriptionRenewed,
    SubscriptionCancelled,
    Other,
}

/// How an event was handled, for logging and tests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// State advanced
    Applied,
    /// Event id seen before; acknowledged without side effects
    Duplicate,
    /// Payment already terminal; acknowledged without side effects
    Ignored,
    /// Event type we don't handle
    Unrecognized,
}

/// Subscription renewal payload
#[derive(Debug, Deserialize)]
struct RenewalPayload {
    organization_id: String,
    plan_id: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
}

/// Webhook reconciliation state machine
pub struct Reconciler {
    store: Arc<dyn SettlementStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    /// Process one gateway event.
    ///
    /// An unknown transaction reference persists an operator alert
    /// and returns [`SettlementError::UnknownTransactionReference`];
    /// it is never silently dropped, since it implies a lost
    /// settlement write.
    pub fn handle_event(&self, event: &GatewayEvent) -> Result<Disposition> {
        if self.store.is_event_processed(&event.event_id)? {
            tracing::debug!(event_id = %event.event_id, "Duplicate webhook event acknowledged");
            return Ok(Disposition::Duplicate);
        }

        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            transaction_id = %event.transaction_id,
            "Processing gateway event"
        );

        let disposition = match event.kind() {
            EventKind::ChargeSucceeded => self.apply_charge_succeeded(event),
            EventKind::ChargeFailed => self.apply_charge_failed(event),
            EventKind::SubscriptionRenewed => self.apply_subscription_renewed(event),
            EventKind::SubscriptionCancelled => self.apply_subscription_cancelled(event),
            EventKind::Other => {
                tracing::debug!(event_type = %event.event_type, "Unhandled gateway event type");
                Ok(Disposition::Unrecognized)
            }
        }?;

        // Recorded only after the transition lands. An error above
        // leaves the event unrecorded, so gateway redelivery retries
        // it. Two racing deliveries can both pass the gate; the
        // terminal-state checks and the idempotent subscription
        // upsert make the second application a no-op.
        self.store.record_event(&event.event_id)?;
        Ok(disposition)
    }

    fn apply_charge_succeeded(&self, event: &GatewayEvent) -> Result<Disposition> {
        let Some(payment) = self.store.payment_by_external_txn(&event.transaction_id)? else {
            return self.unknown_transaction(event);
        };

        let now = Utc::now();
        if !self.store.complete_payment(payment.id, now)? {
            tracing::debug!(
                payment_id = %payment.id,
                "Late charge.succeeded for terminal payment, ignored"
            );
            return Ok(Disposition::Ignored);
        }
        self.store.promote_splits(payment.id, now)?;

        tracing::info!(
            payment_id = %payment.id,
            gross = %payment.gross_amount,
            "Payment completed, agency splits queued for transfer"
        );
        Ok(Disposition::Applied)
    }

    fn apply_charge_failed(&self, event: &GatewayEvent) -> Result<Disposition> {
        let Some(payment) = self.store.payment_by_external_txn(&event.transaction_id)? else {
            return self.unknown_transaction(event);
        };

        let reason = event
            .payload
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("charge failed");

        if !self.store.fail_payment(payment.id, reason, Utc::now())? {
            return Ok(Disposition::Ignored);
        }

        // Splits stay pending: orphaned, kept for audit, never transferred.
        tracing::warn!(
            payment_id = %payment.id,
            reason = %reason,
            "Payment failed"
        );
        Ok(Disposition::Applied)
    }

    fn apply_subscription_renewed(&self, event: &GatewayEvent) -> Result<Disposition> {
        let renewal: RenewalPayload = serde_json::from_value(event.payload.clone())
            .map_err(|e| SettlementError::WebhookParse(format!("renewal payload: {e}")))?;

        let now = Utc::now();
        let subscription = match self.store.subscription_by_external(&event.transaction_id)? {
            Some(mut existing) => {
                existing.status = SubscriptionStatus::Active;
                existing.current_period_start = renewal.period_start;
                existing.current_period_end = renewal.period_end;
                existing.updated_at = now;
                existing
            }
            None => Subscription {
                id: Uuid::new_v4(),
                organization_id: OrganizationId::from_string(renewal.organization_id),
                plan_id: PlanId::from_string(renewal.plan_id),
                external_sub_id: event.transaction_id.clone(),
                status: SubscriptionStatus::Active,
                current_period_start: renewal.period_start,
                current_period_end: renewal.period_end,
                updated_at: now,
            },
        };

        self.store.upsert_subscription(subscription)?;
        tracing::info!(
            external_sub_id = %event.transaction_id,
            "Subscription renewed"
        );
        Ok(Disposition::Applied)
    }

    fn apply_subscription_cancelled(&self, event: &GatewayEvent) -> Result<Disposition> {
        let Some(mut subscription) = self.store.subscription_by_external(&event.transaction_id)?
        else {
            tracing::warn!(
                external_sub_id = %event.transaction_id,
                "Cancellation for unknown subscription, ignored"
            );
            return Ok(Disposition::Ignored);
        };

        subscription.status = SubscriptionStatus::Cancelled;
        subscription.updated_at = Utc::now();
        self.store.upsert_subscription(subscription)?;
        tracing::info!(
            external_sub_id = %event.transaction_id,
            "Subscription cancelled"
        );
        Ok(Disposition::Applied)
    }

    fn unknown_transaction(&self, event: &GatewayEvent) -> Result<Disposition> {
        self.store.push_alert(OperatorAlert::unknown_transaction(
            &event.event_id,
            &event.transaction_id,
        ))?;
        // Redelivery cannot resolve an unknown transaction; the
        // operator queue owns remediation. Recording the event here
        // keeps redeliveries from stacking up duplicate alerts.
        self.store.record_event(&event.event_id)?;
        tracing::error!(
            event_id = %event.event_id,
            transaction_id = %event.transaction_id,
            "Webhook references unknown transaction, operator alert raised"
        );
        Err(SettlementError::UnknownTransactionReference(
            event.transaction_id.clone(),
        ))
    }
}
