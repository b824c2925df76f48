//! # Payment Gateway
//!
//! Abstraction over the remote card-terminal gateway.
//!
//! ## Charge Lifecycle (as seen by the gateway)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  begin_charge ──► PENDING ──┬──► SUCCESSFUL                            │
//! │   (charge ref)              ├──► FAILED                                │
//! │                             └──► CANCELED  ◄── cancel_charge(terminal) │
//! │                                                                         │
//! │  query_charge_status(ref) ─► current snapshot, or NotFound             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Implementations
//! - [`http::HttpGateway`] - REST reader-checkout API
//! - [`mock::MockGateway`] - scripted, in-process (development and tests)

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use boxoffice_core::Money;

pub use http::{HttpGateway, HttpGatewayConfig};
pub use mock::MockGateway;

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

// =============================================================================
// Gateway Error
// =============================================================================

/// Gateway call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway affirmatively does not know the charge.
    #[error("Charge not found: {0}")]
    NotFound(String),

    /// Too many requests, back off.
    #[error("Gateway rate limited")]
    RateLimited,

    /// Request never got a response (DNS, TLS, timeout, reset).
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// Gateway answered with a server error.
    #[error("Gateway error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Gateway refused the request (bad terminal, bad amount, auth).
    #[error("Gateway rejected request: {0}")]
    Rejected(String),

    /// Response body did not have the expected shape.
    #[error("Cannot decode gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Returns true if the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::RateLimited | GatewayError::Transport(_) => true,
            GatewayError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// =============================================================================
// Charge Types
// =============================================================================

/// Charge status reported by the gateway.
///
/// Parsed case-insensitively from the gateway's upper-case strings. Anything
/// unrecognised is kept verbatim in `Unknown` so the caller can log it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChargeStatus {
    Pending,
    Successful,
    Failed,
    Canceled,
    Unknown(String),
}

impl ChargeStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => ChargeStatus::Pending,
            "SUCCESSFUL" => ChargeStatus::Successful,
            "FAILED" => ChargeStatus::Failed,
            "CANCELED" | "CANCELLED" => ChargeStatus::Canceled,
            _ => ChargeStatus::Unknown(raw.to_string()),
        }
    }

    /// Returns true once the gateway will not change its answer any more.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ChargeStatus::Successful | ChargeStatus::Failed | ChargeStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChargeStatus::Pending => "PENDING",
            ChargeStatus::Successful => "SUCCESSFUL",
            ChargeStatus::Failed => "FAILED",
            ChargeStatus::Canceled => "CANCELED",
            ChargeStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ChargeStatus {
    fn from(raw: String) -> Self {
        ChargeStatus::parse(&raw)
    }
}

impl From<ChargeStatus> for String {
    fn from(status: ChargeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gateway currently says about a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeSnapshot {
    pub status: ChargeStatus,
    /// Gateway-side transaction identifier, present once the charge settled.
    pub transaction_ref: Option<String>,
}

impl ChargeSnapshot {
    pub fn new(status: ChargeStatus) -> Self {
        ChargeSnapshot {
            status,
            transaction_ref: None,
        }
    }

    pub fn with_transaction_ref(mut self, transaction_ref: impl Into<String>) -> Self {
        self.transaction_ref = Some(transaction_ref.into());
        self
    }
}

/// A request to put an amount on a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub terminal_id: String,
    /// Gross amount, already rounded to the currency scale.
    pub amount: Money,
    /// ISO 4217 code.
    pub currency: String,
    pub description: String,
    /// Our purchase ID, echoed back by the gateway as its foreign reference.
    pub purchase_ref: Uuid,
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// Remote payment gateway driving physical card terminals.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a charge on the terminal. Returns the gateway's charge reference.
    async fn begin_charge(&self, request: &ChargeRequest) -> GatewayResult<String>;

    /// Looks up a charge.
    ///
    /// ## Errors
    /// * `GatewayError::NotFound` - the gateway does not know `charge_ref`
    /// * anything else - outcome unknown, ask again later
    async fn query_charge_status(&self, charge_ref: &str) -> GatewayResult<ChargeSnapshot>;

    /// Aborts whatever charge is currently shown on the terminal.
    ///
    /// The outcome is observed through [`PaymentGateway::query_charge_status`],
    /// never assumed.
    async fn cancel_charge(&self, terminal_id: &str) -> GatewayResult<()>;
}
