//! Error Types for the Settlement Engine

use thiserror::Error;

/// Result type alias for settlement operations
pub type Result<T> = std::result::Result<T, SettlementError>;

/// Settlement error taxonomy
#[derive(Error, Debug)]
pub enum SettlementError {
    /// Fee percentages outside [0, 100] or a split that would go negative
    #[error("Invalid fee configuration: {0}")]
    InvalidFeeConfiguration(String),

    /// Idempotency key collision - the original resource already exists
    #[error("Duplicate request, existing payment {payment_id}")]
    DuplicateRequest { payment_id: uuid::Uuid },

    /// Gateway failure worth retrying (timeout, rate limit, 5xx)
    #[error("Gateway transient error: {0}")]
    GatewayTransient(String),

    /// Gateway failure that will never succeed (declined, invalid destination)
    #[error("Gateway permanent error: {0}")]
    GatewayPermanent(String),

    /// Webhook references a payment we never recorded - implies a lost write
    #[error("Unknown transaction reference: {0}")]
    UnknownTransactionReference(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SettlementError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::GatewayTransient(_) | SettlementError::Storage(_)
        )
    }

    /// Get user-friendly message (payers never see split/transfer detail)
    pub fn user_message(&self) -> &str {
        match self {
            SettlementError::InvalidFeeConfiguration(_) => {
                "The billing plan is misconfigured. Please contact support."
            }
            SettlementError::GatewayTransient(_) => {
                "Payment processing is temporarily unavailable. Please try again."
            }
            SettlementError::GatewayPermanent(_) => "Your payment could not be processed.",
            SettlementError::NotFound(_) => "The requested resource was not found.",
            SettlementError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(SettlementError::GatewayTransient("timeout".into()).is_retryable());
        assert!(!SettlementError::GatewayPermanent("declined".into()).is_retryable());
        assert!(!SettlementError::InvalidFeeConfiguration("pct".into()).is_retryable());
    }
}
