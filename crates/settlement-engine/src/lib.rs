//! # settlement-engine
//!
//! The payment settlement and revenue-split engine: takes a
//! customer's charge, records how the proceeds divide between the
//! platform operator and the reselling agency, reconciles that record
//! against at-least-once gateway webhooks, and drives idempotent fund
//! transfers to agency sub-accounts with bounded retry.
//!
//! ## Control flow
//!
//! ```text
//! initiate_settlement        gateway webhook          background worker
//! ┌─────────────────┐      ┌────────────────┐      ┌───────────────────┐
//! │  Orchestrator   │      │   Reconciler   │      │ TransferExecutor  │
//! │ Payment+Splits  │─────▶│ pending →      │─────▶│ processing splits │
//! │ persisted, then │charge│ completed /    │ mark │ → gateway transfer│
//! │ gateway charge  │      │ failed (dedup) │ proc.│ → commission row  │
//! └─────────────────┘      └────────────────┘      └───────────────────┘
//! ```
//!
//! Money-correctness rules enforced here:
//! - local writes that must survive a crash commit before any network
//!   call, never inside the same transaction as one
//! - webhook events deduplicate by event id; terminal payments accept
//!   no further transitions
//! - per-split transfers are claimed with a check-and-set so two
//!   workers never both call the gateway for the same split, and the
//!   gateway idempotency key derives from the split id

pub mod commission;
pub mod config;
pub mod gateway;
pub mod orchestrator;
pub mod store;
pub mod transfer;
pub mod webhook;

pub use commission::{CommissionAggregator, CommissionSummary};
pub use config::EngineConfig;
pub use gateway::{
    HttpGateway, MockFailure, MockGateway, PaymentGateway, TransactionHandle, TransferHandle,
};
pub use orchestrator::{PaymentStatusView, SettlementOrchestrator, SettlementRequest};
pub use store::{MemorySettlementStore, SettlementStore};
pub use transfer::{TransferExecutor, TransferOutcome};
pub use webhook::{
    sign, verify_signature, Disposition, EventKind, GatewayEvent, Reconciler, SIGNATURE_HEADER,
};
