//! # boxoffice-core: Pure Business Logic for the Box Office
//!
//! This crate holds the purchase rules of the box office as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Box Office Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 backoffice-api (axum REST + WebSocket)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   boxoffice-settlement (service, reconciler, publisher)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ boxoffice-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   cart    │  │ validation│  │   │
//! │  │   │ Purchase  │  │   Money   │  │   Cart    │  │ structure │  │   │
//! │  │   │  Guest    │  │  VatRate  │  │  pricing  │  │  guests   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 boxoffice-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Guest, Purchase, statuses)
//! - [`money`] - Exact decimal money
//! - [`cart`] - Client cart and authoritative pricing
//! - [`error`] - Domain error types
//! - [`validation`] - Cart structure and guest eligibility
//!
//! ## Example Usage
//!
//! ```rust
//! use boxoffice_core::{PurchaseStatus, PaymentMethod};
//!
//! assert_eq!(PaymentMethod::CardTerminal.initial_status(), PurchaseStatus::Pending);
//! assert!(PurchaseStatus::Pending.can_transition_to(PurchaseStatus::Confirmed));
//! assert!(!PurchaseStatus::Failed.can_transition_to(PurchaseStatus::Confirmed));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartLine, GuestCheckIn, PricedCart};
pub use error::{CoreError, CoreResult, ValidationError, ValidationResult};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity on a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Currency scale used when nothing else is configured.
pub const DEFAULT_DECIMAL_PLACES: u32 = 2;
