//! # Money Module
//!
//! Provides the `Money` type for handling monetary values exactly.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Product prices are entered GROSS and stored NET:                      │
//! │    40.00 / 1.07 = 37.383177570093457943925233645                       │
//! │    Integer cents cannot hold that, a float cannot hold it exactly.    │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal::Decimal                                   │
//! │    Exact base-10 arithmetic, rounded ONCE at a configured scale        │
//! │    (e.g. 2 decimal places for EUR) using commercial rounding.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use boxoffice_core::money::Money;
//! use boxoffice_core::types::VatRate;
//!
//! let net = Money::from_cents(3738);              // 37.38
//! let gross = net.with_vat(VatRate::from_bps(700)).round_dp(2);
//! assert_eq!(gross, Money::from_cents(4000));     // 40.00
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::str::FromStr;
use ts_rs::TS;

use crate::types::VatRate;

// =============================================================================
// Money Type
// =============================================================================

/// An exact monetary amount in the deployment currency.
///
/// ## Design Decisions
/// - **Decimal inner value**: Keeps full precision of authoritative prices
/// - **Explicit rounding**: Nothing rounds implicitly, callers pick the scale
/// - **Serialized as string**: `"37.38"` on the wire, never a JSON float
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.net_price ──► round_dp(2) ──► compared with CartLine price    │
/// │                               │                                         │
/// │                               ├──► × quantity ──► line net             │
/// │                               │                                         │
/// │                               └──► × (1 + VAT) ──► line gross          │
/// │                                                                         │
/// │  Σ line net  ──► Purchase.total_net_price                              │
/// │  Σ line gross ──► round_dp(2) ──► Purchase.total_gross_price           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(#[ts(type = "string")] Decimal);

impl Money {
    /// Wraps an exact decimal amount.
    #[inline]
    pub const fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Creates a Money value from cents (two decimal places).
    ///
    /// ## Example
    /// ```rust
    /// use boxoffice_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.to_string(), "10.99");
    /// ```
    #[inline]
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// Returns the inner decimal amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Rounds to `decimal_places` using commercial rounding (half away from zero).
    ///
    /// ## Example
    /// ```rust
    /// use boxoffice_core::money::Money;
    /// use rust_decimal_macros::dec;
    ///
    /// assert_eq!(Money::new(dec!(39.9966)).round_dp(2), Money::new(dec!(40.00)));
    /// assert_eq!(Money::new(dec!(0.125)).round_dp(2), Money::new(dec!(0.13)));
    /// ```
    pub fn round_dp(&self, decimal_places: u32) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub fn multiply_quantity(&self, qty: i64) -> Money {
        Money(self.0 * Decimal::from(qty))
    }

    /// Applies a VAT rate to a net amount, returning the unrounded gross amount.
    ///
    /// ## Example
    /// ```rust
    /// use boxoffice_core::money::Money;
    /// use boxoffice_core::types::VatRate;
    /// use rust_decimal_macros::dec;
    ///
    /// let gross = Money::from_cents(1000).with_vat(VatRate::from_bps(1900));
    /// assert_eq!(gross, Money::new(dec!(11.90)));
    /// ```
    pub fn with_vat(&self, rate: VatRate) -> Money {
        Money(self.0 * rate.multiplier())
    }

    /// Returns the VAT portion of a net amount (unrounded).
    pub fn vat_amount(&self, rate: VatRate) -> Money {
        self.with_vat(rate) - *self
    }

    /// Converts to integer minor units at the given scale, rounding first.
    ///
    /// Returns `None` when the amount does not fit in an `i64`.
    pub fn to_minor_units(&self, decimal_places: u32) -> Option<i64> {
        let factor = Decimal::from(10_i64.checked_pow(decimal_places)?);
        self.round_dp(decimal_places)
            .0
            .checked_mul(factor)?
            .trunc()
            .to_i64()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering, e.g. `40.00`. Currency formatting is a client concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money(amount)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
