//! # Box Office Settlement
//!
//! Payment settlement pipeline of the box office back end.
//!
//! ## Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Cart ──► CheckoutCoordinator                                          │
//! │               │                                                         │
//! │               ├── cash / card / voucher ──► PurchaseService (confirmed) │
//! │               │                                                         │
//! │               └── card_terminal ──► PurchaseService (pending)          │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                               PaymentGateway.begin_charge               │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                   Reconciler (one loop per purchase, LoopRegistry)      │
//! │                                        │                                │
//! │                           finalize / fail / cancel                      │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                   StatusPublisher ──► LiveSession ──► operator screen   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - [`service`] - validation, atomic writes and status transitions
//! - [`checkout`] - cart entry point, starts charges
//! - [`gateway`] - gateway trait, HTTP adapter and mock
//! - [`reconciler`] - polling loops
//! - [`registry`] - one loop per purchase
//! - [`publisher`] - one live subscriber per purchase
//! - [`live`] - live connection protocol
//! - [`notify`] - guest arrival notifications

pub mod checkout;
pub mod error;
pub mod gateway;
pub mod live;
pub mod notify;
pub mod publisher;
pub mod reconciler;
pub mod registry;
pub mod service;

#[cfg(test)]
mod testing;

pub use checkout::CheckoutCoordinator;
pub use error::{NotifyError, PublishError, SettlementError, SettlementResult};
pub use gateway::{
    ChargeRequest, ChargeSnapshot, ChargeStatus, GatewayError, GatewayResult, HttpGateway,
    HttpGatewayConfig, MockGateway, PaymentGateway,
};
pub use live::{LiveChannel, LiveMessage, LiveSession};
pub use notify::{ArrivalNotifier, TracingNotifier};
pub use publisher::{StatusPublisher, Subscription};
pub use reconciler::{Reconciler, Reconciliation};
pub use registry::{InMemoryLoopRegistry, LoopLease, LoopRegistry};
pub use service::{PurchaseService, SettlementOptions};
