//! Mock Payment Gateway
//!
//! Records every call and can be scripted to fail, for tests and for
//! running the server without gateway credentials.

use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

use settlement_core::{Money, Result, SettlementError};

use super::{PaymentGateway, TransactionHandle, TransferHandle};

/// Scripted failure mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFailure {
    Transient,
    Permanent,
}

/// A recorded charge invocation
#[derive(Clone, Debug)]
pub struct ChargeCall {
    pub amount: Money,
    pub idempotency_key: String,
}

/// A recorded transfer invocation
#[derive(Clone, Debug)]
pub struct TransferCall {
    pub destination: String,
    pub amount: Money,
    pub idempotency_key: String,
}

/// Mock gateway with scriptable failures
#[derive(Default)]
pub struct MockGateway {
    charge_calls: Mutex<Vec<ChargeCall>>,
    transfer_calls: Mutex<Vec<TransferCall>>,
    charge_mode: Mutex<Option<MockFailure>>,
    transfer_mode: Mutex<Option<MockFailure>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every charge fail until cleared
    pub fn fail_charges(&self, mode: MockFailure) {
        *self.charge_mode.lock().unwrap() = Some(mode);
    }

    /// Make every transfer fail until cleared
    pub fn fail_transfers(&self, mode: MockFailure) {
        *self.transfer_mode.lock().unwrap() = Some(mode);
    }

    /// Clear scripted failures
    pub fn succeed(&self) {
        *self.charge_mode.lock().unwrap() = None;
        *self.transfer_mode.lock().unwrap() = None;
    }

    pub fn charge_calls(&self) -> Vec<ChargeCall> {
        self.charge_calls.lock().unwrap().clone()
    }

    pub fn transfer_calls(&self) -> Vec<TransferCall> {
        self.transfer_calls.lock().unwrap().clone()
    }

    fn failure(mode: Option<MockFailure>, what: &str) -> Result<()> {
        match mode {
            Some(MockFailure::Transient) => Err(SettlementError::GatewayTransient(format!(
                "mock {what} timeout"
            ))),
            Some(MockFailure::Permanent) => Err(SettlementError::GatewayPermanent(format!(
                "mock {what} rejected"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, amount: Money, idempotency_key: &str) -> Result<TransactionHandle> {
        self.charge_calls.lock().unwrap().push(ChargeCall {
            amount,
            idempotency_key: idempotency_key.to_string(),
        });
        Self::failure(*self.charge_mode.lock().unwrap(), "charge")?;
        Ok(TransactionHandle {
            transaction_id: format!("txn_{}", Uuid::new_v4().simple()),
        })
    }

    async fn transfer(
        &self,
        destination_ref: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<TransferHandle> {
        self.transfer_calls.lock().unwrap().push(TransferCall {
            destination: destination_ref.to_string(),
            amount,
            idempotency_key: idempotency_key.to_string(),
        });
        Self::failure(*self.transfer_mode.lock().unwrap(), "transfer")?;
        Ok(TransferHandle {
            transfer_id: format!("tr_{}", Uuid::new_v4().simple()),
        })
    }

    fn name(&self) -> &str {
        "mock-gateway"
    }
}
