//! HTTP Handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use settlement_core::{
    Money, OperatorAlert, OrganizationId, PaymentSplit, PlanId, SettlementError,
};
use settlement_engine::{
    verify_signature, CommissionSummary, GatewayEvent, PaymentStatusView, SettlementRequest,
    SIGNATURE_HEADER,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CreateSettlementRequest {
    pub organization_id: String,
    pub plan_id: String,
    pub gross_amount: Money,
    pub idempotency_key: String,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

fn map_error(err: &SettlementError) -> ApiError {
    match err {
        SettlementError::InvalidFeeConfiguration(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_FEE_CONFIGURATION",
            err.user_message(),
        ),
        SettlementError::NotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "NOT_FOUND", err.user_message())
        }
        SettlementError::GatewayPermanent(_) => error_response(
            StatusCode::PAYMENT_REQUIRED,
            "PAYMENT_DECLINED",
            err.user_message(),
        ),
        SettlementError::GatewayTransient(_) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "GATEWAY_UNAVAILABLE",
            err.user_message(),
        ),
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            err.user_message(),
        ),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Initiate settlement of a charge. Responds with the same
/// payer-visible view as the status endpoint; split and transfer
/// detail stays internal.
pub async fn create_settlement(
    State(state): State<AppState>,
    Json(payload): Json<CreateSettlementRequest>,
) -> Result<(StatusCode, Json<PaymentStatusView>), ApiError> {
    let request = SettlementRequest {
        organization_id: OrganizationId::from_string(payload.organization_id),
        plan_id: PlanId::from_string(payload.plan_id),
        gross_amount: payload.gross_amount,
        idempotency_key: payload.idempotency_key,
    };

    let payment = state
        .orchestrator
        .initiate_settlement(request)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Settlement initiation failed");
            map_error(&e)
        })?;

    Ok((StatusCode::CREATED, Json(PaymentStatusView::from(&payment))))
}

/// Payer-visible payment status
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    state
        .orchestrator
        .payment_status(payment_id)
        .map(Json)
        .map_err(|e| map_error(&e))
}

/// Per-period commission totals for an agency
pub async fn agency_commissions(
    State(state): State<AppState>,
    Path(agency_id): Path<String>,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<CommissionSummary>, ApiError> {
    state
        .aggregator
        .aggregate(
            &OrganizationId::from_string(agency_id),
            period.from,
            period.to,
        )
        .map(Json)
        .map_err(|e| map_error(&e))
}

/// Operator queue: webhook events that referenced unknown transactions
pub async fn operator_alerts(
    State(state): State<AppState>,
) -> Result<Json<Vec<OperatorAlert>>, ApiError> {
    state.store.alerts().map(Json).map_err(|e| map_error(&e))
}

/// Operator queue: terminally failed transfers awaiting remediation
pub async fn failed_transfers(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentSplit>>, ApiError> {
    state
        .store
        .failed_splits()
        .map(Json)
        .map_err(|e| map_error(&e))
}

/// Gateway webhook endpoint.
///
/// Returns success only after the event is durably recorded as
/// processed, so gateway-side redelivery behaves correctly if the
/// handler crashes mid-flight. An unknown transaction reference is
/// acknowledged too: the operator alert is already persisted and
/// redelivering the event would not help.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_SIGNATURE",
                "Missing gateway signature",
            )
        })?;

    verify_signature(&state.webhook_secret, body.as_bytes(), signature).map_err(|e| {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        error_response(StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", "Invalid signature")
    })?;

    let event = GatewayEvent::parse(body.as_bytes()).map_err(|e| {
        tracing::warn!(error = %e, "Webhook payload parse failed");
        error_response(StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", "Invalid payload")
    })?;

    match state.reconciler.handle_event(&event) {
        Ok(_) => Ok(StatusCode::OK),
        Err(SettlementError::UnknownTransactionReference(_)) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!(event_id = %event.event_id, error = %e, "Webhook processing error");
            Err(map_error(&e))
        }
    }
}
