//! # Domain Types
//!
//! Core domain types used throughout the box office back office.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Purchase     │   │    LineItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  id (UUID v7)   │──►│  product_id     │       │
//! │  │  net_price      │   │  status         │   │  quantity       │       │
//! │  │  vat_rate       │   │  payment_method │   │  net_price snap │       │
//! │  └────────┬────────┘   │  totals         │   │  vat_rate snap  │       │
//! │           │            │  gateway refs   │   └─────────────────┘       │
//! │           ▼            └────────▲────────┘                             │
//! │  ┌─────────────────┐            │ purchase_id                          │
//! │  │   GuestList     │   ┌────────┴────────┐                             │
//! │  │  product_id     │◄──│     Guest       │                             │
//! │  └─────────────────┘   │  attended_guests│                             │
//! │                        │  arrived_at     │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// VAT Rate
// =============================================================================

/// VAT rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 700 bps = 7% (reduced German rate), 1900 bps = 19%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatRate(u32);

impl VatRate {
    /// Creates a VAT rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        VatRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns `1 + rate` as an exact decimal, e.g. `1.07` for 700 bps.
    #[inline]
    pub fn multiplier(&self) -> Decimal {
        Decimal::ONE + Decimal::new(i64::from(self.0), 4)
    }

    /// Zero VAT rate.
    #[inline]
    pub const fn zero() -> Self {
        VatRate(0)
    }
}

impl Default for VatRate {
    fn default() -> Self {
        VatRate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale. Prices are authoritative on the server.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    #[ts(as = "String")]
    pub id: Uuid,

    /// Display name shown to the operator and on receipts.
    pub name: String,

    /// Net price per unit. May carry more precision than the currency.
    pub net_price: Money,

    /// VAT rate applied on top of the net price.
    pub vat_rate: VatRate,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Guest List & Guest
// =============================================================================

/// A guest list. Every list belongs to exactly one product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GuestList {
    #[ts(as = "String")]
    pub id: Uuid,
    #[ts(as = "String")]
    pub product_id: Uuid,
    pub name: String,
}

/// A reservable admission slot that a purchase can claim.
///
/// ## Check-in Lifecycle
/// ```text
/// attended_guests = 0, purchase_id = NULL     (free)
///        │ purchase created (any status)
///        ▼
/// attended_guests = n, arrived_at = now, purchase_id = P
///        │ P failed / cancelled / deleted
///        ▼
/// attended_guests = 0, arrived_at = NULL, purchase_id = NULL
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Guest {
    #[ts(as = "String")]
    pub id: Uuid,

    #[ts(as = "String")]
    pub guest_list_id: Uuid,

    /// Product of the owning guest list (denormalised on read).
    #[ts(as = "String")]
    pub product_id: Uuid,

    pub name: String,

    /// Where to send the arrival notification, if anywhere.
    pub notification_address: Option<String>,

    /// Maximum number of extra attendees this entry may admit.
    pub additional_guests: u32,

    /// 0 until checked in.
    pub attended_guests: u32,

    #[ts(as = "Option<String>")]
    pub arrived_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub purchase_id: Option<Uuid>,
}

impl Guest {
    /// Returns true once a purchase has claimed this guest.
    #[inline]
    pub fn has_attended(&self) -> bool {
        self.attended_guests != 0
    }

    /// Maximum attendees a single check-in may request.
    #[inline]
    pub fn max_attendees(&self) -> u32 {
        self.additional_guests.saturating_add(1)
    }
}

// =============================================================================
// Purchase Status
// =============================================================================

/// Settlement status of a purchase.
///
/// ## Transitions
/// ```text
///              ┌──────────► confirmed ──────► refunded
///              │
///   pending ───┼──────────► failed
///              │
///              └──────────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Card-terminal charge requested, outcome unknown.
    Pending,
    /// Paid.
    Confirmed,
    /// Gateway declined or lost the charge.
    Failed,
    /// Charge cancelled on the terminal.
    Cancelled,
    /// Paid, then refunded.
    Refunded,
}

impl PurchaseStatus {
    /// Terminal states are never left automatically.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: PurchaseStatus) -> bool {
        use PurchaseStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Failed) | (Pending, Cancelled) | (Confirmed, Refunded)
        )
    }

    /// Returns true if entering this state releases the guests a purchase claimed.
    #[inline]
    pub fn releases_guests(&self) -> bool {
        matches!(self, PurchaseStatus::Failed | PurchaseStatus::Cancelled)
    }

    /// Stable lowercase name, matches the database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Confirmed => "confirmed",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Cancelled => "cancelled",
            PurchaseStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash.
    Cash,
    /// Card swiped on a standalone terminal, settled at the counter.
    Card,
    /// Prepaid voucher.
    Voucher,
    /// Card charge driven through the remote payment gateway.
    CardTerminal,
}

impl PaymentMethod {
    /// Returns true if the payment settles asynchronously through the gateway.
    #[inline]
    pub fn settles_remotely(&self) -> bool {
        matches!(self, PaymentMethod::CardTerminal)
    }

    /// The status a freshly created purchase starts in.
    #[inline]
    pub fn initial_status(&self) -> PurchaseStatus {
        if self.settles_remotely() {
            PurchaseStatus::Pending
        } else {
            PurchaseStatus::Confirmed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Voucher => "voucher",
            PaymentMethod::CardTerminal => "card_terminal",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Purchase & Line Item
// =============================================================================

/// One product/quantity entry. Uses snapshot pattern to freeze prices at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineItem {
    #[ts(as = "String")]
    pub product_id: Uuid,
    pub quantity: i64,
    /// Unit net price at time of sale (frozen, rounded to the currency scale).
    pub net_price: Money,
    /// VAT rate at time of sale (frozen).
    pub vat_rate: VatRate,
}

impl LineItem {
    /// Net amount of the line.
    #[inline]
    pub fn net_total(&self) -> Money {
        self.net_price.multiply_quantity(self.quantity)
    }

    /// Unrounded gross amount of the line.
    #[inline]
    pub fn gross_total(&self) -> Money {
        self.net_total().with_vat(self.vat_rate)
    }
}

/// A sale transaction and its settlement state.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Purchase {
    #[ts(as = "String")]
    pub id: Uuid,
    pub status: PurchaseStatus,
    pub payment_method: PaymentMethod,
    pub total_net_price: Money,
    pub total_gross_price: Money,
    pub line_items: Vec<LineItem>,
    pub gateway_charge_ref: Option<String>,
    pub gateway_transaction_ref: Option<String>,
    pub terminal_id: Option<String>,
    #[ts(as = "String")]
    pub created_by: Uuid,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    /// Returns true if `operator` rang up this purchase.
    #[inline]
    pub fn is_owned_by(&self, operator: &Operator) -> bool {
        self.created_by == operator.id
    }

    /// Creator within `grace_window` of creation, or any administrator.
    pub fn refundable_by(&self, operator: &Operator, now: DateTime<Utc>, grace_window: Duration) -> bool {
        operator.is_admin() || (self.is_owned_by(operator) && now - self.created_at <= grace_window)
    }

    /// Creator or any administrator.
    pub fn deletable_by(&self, operator: &Operator) -> bool {
        operator.is_admin() || self.is_owned_by(operator)
    }
}

// =============================================================================
// Operator
// =============================================================================

/// Role carried in the operator's access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    Admin,
    Operator,
}

/// The authenticated person ringing up sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub id: Uuid,
    pub role: OperatorRole,
}

impl Operator {
    pub fn new(id: Uuid, role: OperatorRole) -> Self {
        Operator { id, role }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == OperatorRole::Admin
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn purchase_created_by(operator: Uuid, created_at: DateTime<Utc>) -> Purchase {
        Purchase {
            id: Uuid::now_v7(),
            status: PurchaseStatus::Confirmed,
            payment_method: PaymentMethod::Cash,
            total_net_price: Money::from_cents(1000),
            total_gross_price: Money::from_cents(1070),
            line_items: vec![],
            gateway_charge_ref: None,
            gateway_transaction_ref: None,
            terminal_id: None,
            created_by: operator,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_vat_multiplier() {
        assert_eq!(VatRate::from_bps(700).multiplier(), dec!(1.07));
        assert_eq!(VatRate::from_bps(1900).multiplier(), dec!(1.19));
        assert_eq!(VatRate::zero().multiplier(), dec!(1));
    }

    #[test]
    fn test_status_transitions() {
        use PurchaseStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Refunded));

        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Failed.can_transition_to(Confirmed));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PurchaseStatus::Pending.is_terminal());
        assert!(PurchaseStatus::Confirmed.is_terminal());
        assert!(PurchaseStatus::Refunded.is_terminal());
        assert!(PurchaseStatus::Failed.releases_guests());
        assert!(!PurchaseStatus::Refunded.releases_guests());
    }

    #[test]
    fn test_initial_status_by_method() {
        assert_eq!(PaymentMethod::CardTerminal.initial_status(), PurchaseStatus::Pending);
        assert_eq!(PaymentMethod::Cash.initial_status(), PurchaseStatus::Confirmed);
        assert_eq!(PaymentMethod::Card.initial_status(), PurchaseStatus::Confirmed);
        assert_eq!(PaymentMethod::Voucher.initial_status(), PurchaseStatus::Confirmed);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::CardTerminal).unwrap(),
            "\"card_terminal\""
        );
        assert_eq!(
            serde_json::to_string(&PurchaseStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_refund_grace_window() {
        let creator = Operator::new(Uuid::new_v4(), OperatorRole::Operator);
        let other = Operator::new(Uuid::new_v4(), OperatorRole::Operator);
        let admin = Operator::new(Uuid::new_v4(), OperatorRole::Admin);
        let created = Utc::now();
        let purchase = purchase_created_by(creator.id, created);
        let window = Duration::minutes(15);

        assert!(purchase.refundable_by(&creator, created + Duration::minutes(14), window));
        assert!(!purchase.refundable_by(&creator, created + Duration::minutes(16), window));
        assert!(!purchase.refundable_by(&other, created, window));
        assert!(purchase.refundable_by(&admin, created + Duration::days(30), window));
    }

    #[test]
    fn test_line_item_totals() {
        let item = LineItem {
            product_id: Uuid::new_v4(),
            quantity: 2,
            net_price: Money::from_cents(1869),
            vat_rate: VatRate::from_bps(700),
        };
        assert_eq!(item.net_total(), Money::from_cents(3738));
        assert_eq!(item.gross_total().round_dp(2), Money::from_cents(4000));
    }
}
