//! # Live Channel
//!
//! Transport-independent half of the per-purchase live connection. The HTTP
//! layer owns the socket; this module decides what goes over it.
//!
//! ## Message Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Client                                   Server                        │
//! │                                                                         │
//! │  (connect) ────────────────────────────►  subscribe, load purchase      │
//! │            ◄──────────────────────────── status_update (current)       │
//! │                                                                         │
//! │  ping      ────────────────────────────►                                │
//! │            ◄──────────────────────────── ping_ack                       │
//! │                                                                         │
//! │  cancel_payment ───────────────────────►  gateway.cancel_charge        │
//! │            ◄──────────────────────────── cancel_ack | error             │
//! │                                                                         │
//! │            ◄──────────────────────────── status_update (on change)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Adjacently tagged JSON: `{ "type": "status_update", "payload": { ... } }`.
//! Messages without a payload omit it: `{ "type": "ping" }`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use boxoffice_core::{PurchaseStatus, Purchase};

use crate::error::SettlementResult;
use crate::gateway::PaymentGateway;
use crate::publisher::Subscription;
use crate::service::PurchaseService;

/// Message text sent when a cancel request could not be forwarded.
pub const CANCEL_FAILED: &str = "failed to cancel payment";

// =============================================================================
// Messages
// =============================================================================

/// Every message exchanged on a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Server → client: the purchase's current status.
    StatusUpdate(StatusUpdate),
    /// Server → client: a request could not be served.
    Error(ErrorPayload),
    /// Client → server: abort the charge on the terminal.
    CancelPayment,
    /// Server → client: the cancel request reached the gateway.
    CancelAck,
    /// Client → server keepalive.
    Ping,
    /// Server → client keepalive answer.
    PingAck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub purchase_id: Uuid,
    pub status: PurchaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl LiveMessage {
    pub fn status_update(purchase_id: Uuid, status: PurchaseStatus) -> Self {
        LiveMessage::StatusUpdate(StatusUpdate {
            purchase_id,
            status,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        LiveMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns true for a status update carrying a terminal status.
    pub fn is_final_status(&self) -> bool {
        matches!(self, LiveMessage::StatusUpdate(update) if update.status.is_terminal())
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Opens live sessions.
#[derive(Clone)]
pub struct LiveChannel {
    service: PurchaseService,
    gateway: Arc<dyn PaymentGateway>,
}

impl LiveChannel {
    pub fn new(service: PurchaseService, gateway: Arc<dyn PaymentGateway>) -> Self {
        LiveChannel { service, gateway }
    }

    /// Claims the live slot of `purchase_id` and loads its current status.
    ///
    /// The slot is claimed first so no change can slip between the initial
    /// status and the first update.
    ///
    /// ## Errors
    /// * `Publish(LimitReached)` - another connection watches this purchase
    /// * `NotFound` - no such purchase (the slot is released again)
    pub async fn open(&self, purchase_id: Uuid) -> SettlementResult<LiveSession> {
        let subscription = self.service.publisher().subscribe(purchase_id)?;
        let purchase = self.service.get_purchase(purchase_id).await?;
        debug!(purchase_id = %purchase_id, status = %purchase.status, "Live session opened");

        Ok(LiveSession {
            initial_status: purchase.status,
            subscription,
            service: self.service.clone(),
            gateway: Arc::clone(&self.gateway),
        })
    }
}

// =============================================================================
// Session
// =============================================================================

/// One live connection. Dropping it frees the purchase's slot.
pub struct LiveSession {
    initial_status: PurchaseStatus,
    subscription: Subscription,
    service: PurchaseService,
    gateway: Arc<dyn PaymentGateway>,
}

impl LiveSession {
    pub fn purchase_id(&self) -> Uuid {
        self.subscription.purchase_id()
    }

    /// The status to push as soon as the connection is up.
    pub fn initial_message(&self) -> LiveMessage {
        LiveMessage::status_update(self.purchase_id(), self.initial_status)
    }

    /// Waits for the next status change of the purchase.
    pub async fn next_update(&mut self) -> Option<LiveMessage> {
        let status = self.subscription.recv().await?;
        Some(LiveMessage::status_update(self.purchase_id(), status))
    }

    /// Answers a message sent by the client.
    pub async fn handle_client_message(&self, message: LiveMessage) -> LiveMessage {
        match message {
            LiveMessage::Ping => LiveMessage::PingAck,
            LiveMessage::CancelPayment => self.cancel_payment().await,
            other => {
                debug!(purchase_id = %self.purchase_id(), ?other, "Unexpected client message");
                LiveMessage::error("unexpected message type")
            }
        }
    }

    /// Forwards a cancel request to the gateway.
    ///
    /// The status change itself arrives later through the usual path.
    async fn cancel_payment(&self) -> LiveMessage {
        let purchase_id = self.purchase_id();
        let purchase = match self.service.get_purchase(purchase_id).await {
            Ok(purchase) => purchase,
            Err(e) => {
                warn!(purchase_id = %purchase_id, error = %e, "Cancel request for unreadable purchase");
                return LiveMessage::error(CANCEL_FAILED);
            }
        };

        let Some(terminal_id) = cancellable_terminal(&purchase) else {
            debug!(purchase_id = %purchase_id, status = %purchase.status, "Nothing to cancel");
            return LiveMessage::error(CANCEL_FAILED);
        };

        match self.gateway.cancel_charge(terminal_id).await {
            Ok(()) => {
                debug!(purchase_id = %purchase_id, terminal_id, "Cancel forwarded to gateway");
                LiveMessage::CancelAck
            }
            Err(e) => {
                warn!(purchase_id = %purchase_id, terminal_id, error = %e, "Cancel request failed");
                LiveMessage::error(CANCEL_FAILED)
            }
        }
    }
}

fn cancellable_terminal(purchase: &Purchase) -> Option<&str> {
    if purchase.status != PurchaseStatus::Pending {
        return None;
    }
    purchase.terminal_id.as_deref()
}

// =============================================================================
// Unit Tests
// =============================================================================
