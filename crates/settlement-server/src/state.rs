//! Application State

use std::sync::Arc;

use settlement_engine::{
    CommissionAggregator, Reconciler, SettlementOrchestrator, SettlementStore,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Creates payments and issues charges
    pub orchestrator: Arc<SettlementOrchestrator>,

    /// Webhook reconciliation state machine
    pub reconciler: Arc<Reconciler>,

    /// Read-only commission reporting
    pub aggregator: Arc<CommissionAggregator>,

    /// Settlement storage, for the operator surface
    pub store: Arc<dyn SettlementStore>,

    /// Secret the gateway signs webhook bodies with
    pub webhook_secret: String,
}
