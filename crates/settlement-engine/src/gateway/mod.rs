//! Payment Gateway Integration
//!
//! Abstraction over the external payment processor. The client is
//! constructed once at process start and injected into the
//! orchestrator and transfer executor; there is no module-level
//! shared instance.

mod http;
mod mock;

pub use http::HttpGateway;
pub use mock::{ChargeCall, MockFailure, MockGateway, TransferCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use settlement_core::{Money, Result};

/// Gateway handle for an accepted charge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub transaction_id: String,
}

/// Gateway handle for an executed transfer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferHandle {
    pub transfer_id: String,
}

/// Payment gateway client trait
///
/// Both operations take a caller-supplied idempotency key so a
/// network-level retry of the outbound call cannot double-charge or
/// double-transfer. Errors come back as
/// [`settlement_core::SettlementError::GatewayTransient`] (retryable)
/// or [`settlement_core::SettlementError::GatewayPermanent`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge the payer
    async fn charge(&self, amount: Money, idempotency_key: &str) -> Result<TransactionHandle>;

    /// Move funds to an agency's settlement account
    async fn transfer(
        &self,
        destination_ref: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<TransferHandle>;

    /// Gateway name for logging
    fn name(&self) -> &str;
}
