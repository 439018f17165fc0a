//! HTTP Gateway Adapter
//!
//! Talks to the payment processor's REST API. Timeouts, rate limits
//! and 5xx responses map to transient errors; other 4xx responses are
//! permanent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use settlement_core::{Money, Result, SettlementError};

use super::{PaymentGateway, TransactionHandle, TransferHandle};

/// REST client for the payment gateway
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChargeRequest<'a> {
    amount: Money,
    currency: &'a str,
    idempotency_key: &'a str,
}

#[derive(Deserialize)]
struct ChargeResponse {
    transaction_id: String,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    destination: &'a str,
    amount: Money,
    currency: &'a str,
    idempotency_key: &'a str,
}

#[derive(Deserialize)]
struct TransferResponse {
    transfer_id: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("GATEWAY_BASE_URL")
            .map_err(|_| SettlementError::Config("GATEWAY_BASE_URL not set".into()))?;
        let api_key = std::env::var("GATEWAY_API_KEY")
            .map_err(|_| SettlementError::Config("GATEWAY_API_KEY not set".into()))?;
        Ok(Self::new(base_url, api_key))
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                // connect errors and timeouts are worth retrying
                SettlementError::GatewayTransient(format!("{path}: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| SettlementError::GatewayTransient(format!("{path}: bad body: {e}")));
        }

        let detail = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(SettlementError::GatewayTransient(format!(
                "{path}: {status}: {detail}"
            )))
        } else {
            Err(SettlementError::GatewayPermanent(format!(
                "{path}: {status}: {detail}"
            )))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn charge(&self, amount: Money, idempotency_key: &str) -> Result<TransactionHandle> {
        let response: ChargeResponse = self
            .post_json(
                "/v1/charges",
                &ChargeRequest {
                    amount,
                    currency: "usd",
                    idempotency_key,
                },
            )
            .await?;
        Ok(TransactionHandle {
            transaction_id: response.transaction_id,
        })
    }

    async fn transfer(
        &self,
        destination_ref: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<TransferHandle> {
        let response: TransferResponse = self
            .post_json(
                "/v1/transfers",
                &TransferRequest {
                    destination: destination_ref,
                    amount,
                    currency: "usd",
                    idempotency_key,
                },
            )
            .await?;
        Ok(TransferHandle {
            transfer_id: response.transfer_id,
        })
    }

    fn name(&self) -> &str {
        "http-gateway"
    }
}
