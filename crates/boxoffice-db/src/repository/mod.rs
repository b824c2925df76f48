//! # Repository Module
//!
//! Database repository implementations for the box office.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service code                                                           │
//! │       │  db.purchases().create_with_check_ins(&purchase, &check_ins)    │
//! │       ▼                                                                 │
//! │  Repository ── SQL + row records (sqlx::FromRow)                       │
//! │       │                                                                 │
//! │       │  TryFrom<Record> for domain type (decimal TEXT, bps INTEGER)    │
//! │       ▼                                                                 │
//! │  boxoffice-core types                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Authoritative product prices
//! - [`guest::GuestRepository`] - Guest lists and check-in state
//! - [`purchase::PurchaseRepository`] - Purchases, line items and status transitions

pub mod guest;
pub mod product;
pub mod purchase;

use boxoffice_core::{Money, VatRate};

use crate::error::{DbError, DbResult};

/// Parses a decimal TEXT column.
pub(crate) fn decode_money(column: &str, raw: &str) -> DbResult<Money> {
    raw.parse::<Money>()
        .map_err(|e| DbError::decode(column, e))
}

/// Converts a basis-points INTEGER column.
pub(crate) fn decode_vat_rate(column: &str, bps: i64) -> DbResult<VatRate> {
    u32::try_from(bps)
        .map(VatRate::from_bps)
        .map_err(|e| DbError::decode(column, e))
}

/// Converts a non-negative counter column.
pub(crate) fn decode_count(column: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|e| DbError::decode(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_helpers() {
        assert_eq!(decode_money("net_price", "37.38").unwrap(), Money::from_cents(3738));
        assert!(matches!(
            decode_money("net_price", "abc"),
            Err(DbError::Decode { .. })
        ));
        assert_eq!(decode_vat_rate("vat_rate_bps", 700).unwrap(), VatRate::from_bps(700));
        assert!(decode_vat_rate("vat_rate_bps", -1).is_err());
        assert!(decode_count("attended_guests", -5).is_err());
    }
}
