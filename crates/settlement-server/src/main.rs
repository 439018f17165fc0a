//! Settlement Server
//!
//! Axum-based HTTP server exposing settlement initiation, payment
//! status, commission reporting, the operator queue, and the gateway
//! webhook endpoint. The transfer executor runs as a background task
//! in the same process; webhook handling never waits on it.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settlement_core::{MemoryDirectory, OrganizationDirectory};
use settlement_engine::{
    CommissionAggregator, EngineConfig, HttpGateway, MemorySettlementStore, MockGateway,
    PaymentGateway, Reconciler, SettlementOrchestrator, SettlementStore, TransferExecutor,
};

use crate::handlers::{
    agency_commissions, create_settlement, failed_transfers, gateway_webhook, get_payment,
    health_check, operator_alerts,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env();

    // Storage. The relational backend lives behind the same trait;
    // the in-memory store keeps local runs dependency-free.
    let store: Arc<dyn SettlementStore> = Arc::new(MemorySettlementStore::new());

    // Organization directory (the platform's org service in production)
    let directory: Arc<dyn OrganizationDirectory> = Arc::new(MemoryDirectory::new());

    // Gateway client, constructed once here and injected everywhere
    let gateway: Arc<dyn PaymentGateway> = match HttpGateway::from_env() {
        Ok(gateway) => {
            tracing::info!("✓ Payment gateway configured");
            Arc::new(gateway)
        }
        Err(_) => {
            tracing::warn!("⚠ Gateway not configured - using mock gateway");
            tracing::warn!("  Set GATEWAY_BASE_URL and GATEWAY_API_KEY in .env");
            Arc::new(MockGateway::new())
        }
    };

    let webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_else(|_| {
        tracing::warn!("⚠ GATEWAY_WEBHOOK_SECRET not set - using development secret");
        "whsec_dev".into()
    });

    let orchestrator = Arc::new(SettlementOrchestrator::new(
        store.clone(),
        directory.clone(),
        gateway.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(store.clone()));
    let aggregator = Arc::new(CommissionAggregator::new(store.clone()));

    // Background transfer worker; transfers are deferred work, never
    // part of the webhook's synchronous path
    let executor = Arc::new(TransferExecutor::new(
        store.clone(),
        directory,
        gateway,
        config,
    ));
    tokio::spawn(executor.run());

    let state = AppState {
        orchestrator,
        reconciler,
        aggregator,
        store,
        webhook_secret,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        // Settlement API
        .route("/api/settlements", post(create_settlement))
        .route("/api/payments/{payment_id}", get(get_payment))
        .route("/api/agencies/{agency_id}/commissions", get(agency_commissions))
        // Operator surface
        .route("/api/operator/alerts", get(operator_alerts))
        .route("/api/operator/transfers/failed", get(failed_transfers))
        // Gateway callbacks
        .route("/webhook/gateway", post(gateway_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 settlement-server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                            - Health check");
    tracing::info!("  POST /api/settlements                   - Initiate settlement");
    tracing::info!("  GET  /api/payments/{{id}}                 - Payment status");
    tracing::info!("  GET  /api/agencies/{{id}}/commissions     - Commission totals");
    tracing::info!("  GET  /api/operator/alerts               - Operator alert queue");
    tracing::info!("  GET  /api/operator/transfers/failed     - Failed transfers");
    tracing::info!("  POST /webhook/gateway                   - Gateway webhook");

    axum::serve(listener, app).await?;

    Ok(())
}
