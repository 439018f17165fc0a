//! Transfer Executor
//!
//! Background mover of agency shares. Polls splits in `processing`,
//! claims each with a check-and-set so racing workers never both call
//! the gateway, and keys the gateway transfer off the split's own id
//! for at-most-once movement. Transient failures reschedule with
//! exponential backoff; the wait is scheduling-only, no worker thread
//! ever blocks on it.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use settlement_core::{
    Beneficiary, Commission, OrganizationDirectory, PaymentSplit, Result, SettlementError,
};

use crate::config::EngineConfig;
use crate::gateway::PaymentGateway;
use crate::store::SettlementStore;

/// What happened to one transfer attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Funds moved, commission recorded
    Completed,
    /// Transient failure, rescheduled
    Retry,
    /// Terminal failure, manual remediation required
    Failed,
    /// Beneficiary has no settlement account yet; try again later
    Held,
    /// Another worker holds the claim, or the split is no longer processing
    Skipped,
}

/// Executes fund transfers for processing splits
pub struct TransferExecutor {
    store: Arc<dyn SettlementStore>,
    directory: Arc<dyn OrganizationDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    config: EngineConfig,
}

impl TransferExecutor {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        directory: Arc<dyn OrganizationDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            config,
        }
    }

    /// One polling pass: attempt every due transfer. Returns the
    /// number of splits attempted.
    pub async fn run_once(&self) -> Result<usize> {
        let due = self.store.due_transfers(Utc::now())?;
        let count = due.len();
        for split in due {
            if let Err(e) = self.execute_transfer(split.id).await {
                tracing::error!(split_id = %split.id, error = %e, "Transfer attempt errored");
            }
        }
        Ok(count)
    }

    /// Background loop for the composition root to spawn
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(attempted = n, "Transfer pass finished"),
                Err(e) => tracing::error!(error = %e, "Transfer pass failed"),
            }
        }
    }

    /// Execute the transfer for one split.
    ///
    /// Safe to invoke concurrently for the same split: the store
    /// claim admits exactly one worker, and the gateway idempotency
    /// key (`split-<id>`) backstops at-most-once on the wire.
    pub async fn execute_transfer(&self, split_id: Uuid) -> Result<TransferOutcome> {
        if !self.store.claim_transfer(split_id)? {
            return Ok(TransferOutcome::Skipped);
        }

        let split = match self.fresh_split(split_id) {
            Ok(split) => split,
            Err(e) => {
                self.store
                    .release_transfer(split_id, 0, None, Utc::now())?;
                return Err(e);
            }
        };

        let Beneficiary::Org(ref agency) = split.to_org else {
            // Platform shares never reach processing; the reconciler
            // completes them on payment completion. Close out rather
            // than transfer operator money to itself.
            self.store.complete_transfer(split_id, Utc::now())?;
            return Ok(TransferOutcome::Completed);
        };

        let account = match self.directory.settlement_account_ref(agency).await {
            Ok(account) => account,
            Err(e) => {
                self.store.release_transfer(
                    split_id,
                    split.retry_count,
                    None,
                    Utc::now() + self.config.backoff_for(1),
                )?;
                return Err(e);
            }
        };

        let Some(account) = account else {
            // Agency mid-onboarding must not lose its commission:
            // hold in processing without burning a retry.
            self.store.release_transfer(
                split_id,
                split.retry_count,
                None,
                Utc::now() + self.config.backoff_for(1),
            )?;
            tracing::info!(
                split_id = %split_id,
                agency = %agency,
                "Beneficiary has no settlement account yet, holding split"
            );
            return Ok(TransferOutcome::Held);
        };

        let idempotency_key = format!("split-{split_id}");
        match self
            .gateway
            .transfer(&account, split.amount, &idempotency_key)
            .await
        {
            Ok(handle) => {
                self.store.complete_transfer(split_id, Utc::now())?;
                let commission = Commission::for_completed_split(&split, agency.clone());
                if self.store.record_commission(split_id, commission)? {
                    tracing::info!(
                        split_id = %split_id,
                        agency = %agency,
                        amount = %split.amount,
                        transfer_id = %handle.transfer_id,
                        "Transfer completed, commission recorded"
                    );
                } else {
                    tracing::debug!(split_id = %split_id, "Commission already recorded");
                }
                Ok(TransferOutcome::Completed)
            }
            Err(SettlementError::GatewayTransient(reason)) => {
                let attempts = split.retry_count + 1;
                if attempts >= self.config.max_transfer_attempts {
                    self.store.fail_transfer(split_id, attempts, &reason)?;
                    tracing::error!(
                        split_id = %split_id,
                        attempts,
                        reason = %reason,
                        "Transfer retries exhausted, split failed terminally"
                    );
                    Ok(TransferOutcome::Failed)
                } else {
                    let next = Utc::now() + self.config.backoff_for(attempts);
                    self.store
                        .release_transfer(split_id, attempts, Some(reason.clone()), next)?;
                    tracing::warn!(
                        split_id = %split_id,
                        attempts,
                        next_attempt_at = %next,
                        reason = %reason,
                        "Transient transfer failure, rescheduled"
                    );
                    Ok(TransferOutcome::Retry)
                }
            }
            Err(e) => {
                let reason = e.to_string();
                self.store
                    .fail_transfer(split_id, split.retry_count, &reason)?;
                tracing::error!(
                    split_id = %split_id,
                    reason = %reason,
                    "Permanent transfer failure, split failed terminally"
                );
                Ok(TransferOutcome::Failed)
            }
        }
    }

    fn fresh_split(&self, split_id: Uuid) -> Result<PaymentSplit> {
        self.store
            .split(split_id)?
            .ok_or_else(|| SettlementError::NotFound(format!("split {split_id}")))
    }
}
