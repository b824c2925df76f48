//! # Settlement Error Types
//!
//! Error types for the purchase pipeline.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Settlement Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Client         │  │  Authorization  │  │  State                  │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Forbidden      │  │  InvalidTransition      │ │
//! │  │  NotFound       │  │                 │  │  NotReconcilable        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Gateway        │  │  Database       │  │  Live channel           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  GatewayError   │  │  DbError        │  │  PublishError           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use uuid::Uuid;

use boxoffice_core::{CoreError, PaymentMethod, PurchaseStatus, ValidationError};
use boxoffice_db::DbError;

use crate::gateway::GatewayError;

/// Result type alias for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

/// Everything that can go wrong between "cart submitted" and "purchase settled".
#[derive(Debug, Error)]
pub enum SettlementError {
    // =========================================================================
    // Client Errors
    // =========================================================================
    /// Cart or guest check-in rejected. Nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Operator lacks the right to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // =========================================================================
    // State Errors
    // =========================================================================
    /// The requested transition is not allowed from the purchase's status.
    #[error("Purchase {purchase_id} is {from}, cannot move to {to}")]
    InvalidTransition {
        purchase_id: Uuid,
        from: PurchaseStatus,
        to: PurchaseStatus,
    },

    /// Only card-terminal purchases settle through the gateway.
    #[error("Purchase {purchase_id} is paid by {method} and is not reconciled with the gateway")]
    NotReconcilable {
        purchase_id: Uuid,
        method: PaymentMethod,
    },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Payment gateway call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Live channel admission failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Internal invariant broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    pub(crate) fn purchase_not_found(id: Uuid) -> Self {
        SettlementError::NotFound {
            entity: "Purchase".to_string(),
            id: id.to_string(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SettlementError::Gateway(e) => e.is_transient(),
            SettlementError::Database(DbError::PoolExhausted)
            | SettlementError::Database(DbError::ConnectionFailed(_)) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SettlementError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SettlementError::NotFound { entity, id },
            // A guest claim lost the race to a concurrent purchase
            DbError::Conflict { entity, id } if entity == "Guest" => {
                let guest_id = Uuid::parse_str(&id).unwrap_or_default();
                SettlementError::Validation(ValidationError::GuestAlreadyAttended(guest_id))
            }
            other => SettlementError::Database(other),
        }
    }
}

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition {
                purchase_id,
                from,
                to,
            } => SettlementError::InvalidTransition {
                purchase_id,
                from,
                to,
            },
            CoreError::Validation(e) => SettlementError::Validation(e),
        }
    }
}

// =============================================================================
// Publish Error
// =============================================================================

/// Live channel admission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// A live connection for this purchase already exists.
    #[error("limit reached")]
    LimitReached { purchase_id: Uuid },
}

// =============================================================================
// Notify Error
// =============================================================================

/// Arrival notification could not be delivered. Never fails a purchase.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);
