//! # Error Types
//!
//! Domain-specific error types for boxoffice-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  boxoffice-core errors (this file)                                     │
//! │  ├── CoreError        - Purchase rule violations                       │
//! │  └── ValidationError  - Cart and check-in validation failures          │
//! │                                                                         │
//! │  boxoffice-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  boxoffice-settlement errors                                           │
//! │  └── SettlementError  - What the service layer returns                 │
//! │                                                                         │
//! │  API errors (in app)                                                   │
//! │  └── ApiError         - What the client sees (serialized)              │
//! │                                                                         │
//! │  Flow: ValidationError → SettlementError → ApiError → Client           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stable Kinds
//! Every `ValidationError` variant exposes a `code()` that never changes.
//! Clients switch on the code, the message is for humans.

use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;
use crate::types::{PaymentMethod, PurchaseStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Purchase rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested status transition is not allowed from the current status.
    ///
    /// ## When This Occurs
    /// - Refunding a `pending` purchase
    /// - Failing a purchase that is already `confirmed`
    #[error("Purchase {purchase_id} is {from}, cannot move to {to}")]
    InvalidTransition {
        purchase_id: Uuid,
        from: PurchaseStatus,
        to: PurchaseStatus,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Cart and guest check-in validation failures.
///
/// These are the client's fault and map to HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    MissingField { field: String },

    /// A field is present but malformed.
    #[error("{field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    #[error("Quantity for product {product_id} must be positive, got {quantity}")]
    NonPositiveQuantity { product_id: Uuid, quantity: i64 },

    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Product {0} appears more than once in the cart")]
    DuplicateProduct(Uuid),

    #[error("Guest {0} is checked in more than once in the cart")]
    DuplicateGuest(Uuid),

    #[error("{field} must not be negative")]
    NegativeTotal { field: String },

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    /// Submitted unit price differs from the authoritative rounded price.
    ///
    /// ## User Workflow
    /// ```text
    /// Client cached price 18.50, server price changed to 18.69
    ///      │
    ///      ▼
    /// InvalidProductPrice { expected: 18.69, submitted: 18.50 }
    ///      │
    ///      ▼
    /// Client reloads products and resubmits
    /// ```
    #[error("Price for product {product_id} is {expected}, submitted {submitted}")]
    InvalidProductPrice {
        product_id: Uuid,
        expected: Money,
        submitted: Money,
    },

    #[error("Total net price is {expected}, submitted {submitted}")]
    InvalidTotalNetPrice { expected: Money, submitted: Money },

    #[error("Total gross price is {expected}, submitted {submitted}")]
    InvalidTotalGrossPrice { expected: Money, submitted: Money },

    #[error("Guest not found: {0}")]
    GuestNotFound(Uuid),

    #[error("Guest {0} has already attended")]
    GuestAlreadyAttended(Uuid),

    #[error("Guest {guest_id} may bring at most {allowed} attendees, requested {requested}")]
    TooManyAdditionalGuests {
        guest_id: Uuid,
        allowed: u32,
        requested: u32,
    },

    #[error("Guest {guest_id} does not belong to product {product_id}")]
    ListItemWrongProduct { guest_id: Uuid, product_id: Uuid },

    #[error("Payment method {method} is not allowed here")]
    InvalidPaymentMethod { method: PaymentMethod },
}

impl ValidationError {
    /// Stable machine-readable kind, e.g. `INVALID_PRODUCT_PRICE`.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "MISSING_FIELD",
            ValidationError::InvalidField { .. } => "INVALID_FIELD",
            ValidationError::EmptyCart => "EMPTY_CART",
            ValidationError::CartTooLarge { .. } => "CART_TOO_LARGE",
            ValidationError::NonPositiveQuantity { .. } => "NON_POSITIVE_QUANTITY",
            ValidationError::QuantityTooLarge { .. } => "QUANTITY_TOO_LARGE",
            ValidationError::DuplicateProduct(_) => "DUPLICATE_PRODUCT",
            ValidationError::DuplicateGuest(_) => "DUPLICATE_GUEST",
            ValidationError::NegativeTotal { .. } => "NEGATIVE_TOTAL",
            ValidationError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            ValidationError::InvalidProductPrice { .. } => "INVALID_PRODUCT_PRICE",
            ValidationError::InvalidTotalNetPrice { .. } => "INVALID_TOTAL_NET_PRICE",
            ValidationError::InvalidTotalGrossPrice { .. } => "INVALID_TOTAL_GROSS_PRICE",
            ValidationError::GuestNotFound(_) => "GUEST_NOT_FOUND",
            ValidationError::GuestAlreadyAttended(_) => "GUEST_ALREADY_ATTENDED",
            ValidationError::TooManyAdditionalGuests { .. } => "TOO_MANY_ADDITIONAL_GUESTS",
            ValidationError::ListItemWrongProduct { .. } => "LIST_ITEM_WRONG_PRODUCT",
            ValidationError::InvalidPaymentMethod { .. } => "INVALID_PAYMENT_METHOD",
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;
