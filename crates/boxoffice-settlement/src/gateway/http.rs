//! # HTTP Gateway Adapter
//!
//! Talks to a reader-checkout style REST API.
//!
//! ## Endpoints
//! ```text
//! begin   POST {base}/v0.1/merchants/{merchant}/readers/{terminal}/checkout
//!         { "total_amount": { "value": 4000, "currency": "EUR", "minor_unit": 2 },
//!           "description": "...", "foreign_transaction_id": "<purchase id>" }
//!         ──► { "data": { "client_transaction_id": "<charge ref>" } }
//!
//! query   GET  {base}/v0.1/me/transactions?client_transaction_id=<charge ref>
//!         ──► { "status": "SUCCESSFUL", "id": "<transaction ref>", ... }
//!         404 ──► GatewayError::NotFound
//!
//! cancel  POST {base}/v0.1/merchants/{merchant}/readers/{terminal}/terminate
//! ```

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ChargeRequest, ChargeSnapshot, ChargeStatus, GatewayError, GatewayResult, PaymentGateway};

/// Connection settings for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: Url,
    pub api_key: String,
    pub merchant_code: String,
    pub timeout: Duration,
    /// Minor-unit scale of the currency (2 for EUR).
    pub decimal_places: u32,
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CheckoutBody<'a> {
    total_amount: Amount<'a>,
    description: &'a str,
    foreign_transaction_id: String,
}

#[derive(Debug, Serialize)]
struct Amount<'a> {
    value: i64,
    currency: &'a str,
    minor_unit: u32,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    data: CheckoutData,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    client_transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    status: ChargeStatus,
    #[serde(default, rename = "id")]
    transaction_id: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// REST implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: HttpGatewayConfig,
}

impl HttpGateway {
    /// Builds the HTTP client.
    ///
    /// ## Errors
    /// * `GatewayError::Transport` - TLS backend could not be initialised
    pub fn new(config: HttpGatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(HttpGateway { client, config })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Rejected(format!("unusable base URL {}", self.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn reader_endpoint(&self, terminal_id: &str, action: &str) -> GatewayResult<Url> {
        self.endpoint(&[
            "v0.1",
            "merchants",
            &self.config.merchant_code,
            "readers",
            terminal_id,
            action,
        ])
    }
}

/// Maps non-success statuses to errors. 404 is handled by the caller.
async fn check_status(response: Response) -> GatewayResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
        status if status.is_server_error() => {
            let body = response.text().await.unwrap_or_default();
            Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: body,
            })
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(GatewayError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)))
        }
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn begin_charge(&self, request: &ChargeRequest) -> GatewayResult<String> {
        let value = request
            .amount
            .to_minor_units(self.config.decimal_places)
            .ok_or_else(|| GatewayError::Rejected(format!("amount {} out of range", request.amount)))?;

        let body = CheckoutBody {
            total_amount: Amount {
                value,
                currency: &request.currency,
                minor_unit: self.config.decimal_places,
            },
            description: &request.description,
            foreign_transaction_id: request.purchase_ref.to_string(),
        };

        let url = self.reader_endpoint(&request.terminal_id, "checkout")?;
        debug!(%url, terminal_id = %request.terminal_id, value, "Starting gateway charge");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let checkout: CheckoutResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(checkout.data.client_transaction_id)
    }

    async fn query_charge_status(&self, charge_ref: &str) -> GatewayResult<ChargeSnapshot> {
        let url = self.endpoint(&["v0.1", "me", "transactions"])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .query(&[("client_transaction_id", charge_ref)])
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(charge_ref.to_string()));
        }

        let transaction: TransactionResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(ChargeSnapshot {
            status: transaction.status,
            transaction_ref: transaction.transaction_id,
        })
    }

    async fn cancel_charge(&self, terminal_id: &str) -> GatewayResult<()> {
        let url = self.reader_endpoint(terminal_id, "terminate")?;
        debug!(%url, terminal_id, "Cancelling terminal charge");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(transport)?;

        check_status(response).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
