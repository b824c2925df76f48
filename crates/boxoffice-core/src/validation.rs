//! # Validation Module
//!
//! Cart and guest check-in validation for the box office.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Structure (THIS MODULE, no I/O)                              │
//! │  ├── empty cart, line count, quantities                                │
//! │  ├── duplicate products / guests, negative claims                      │
//! │  └── payment method allowed for the operation                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Pricing (cart.rs, authoritative products)                    │
//! │  └── unit prices, net and gross totals                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Guest eligibility (THIS MODULE, fetched guests)              │
//! │  └── found, not attended, attendee count, product ownership            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  └── conditional claim UPDATE inside the purchase transaction          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use boxoffice_core::validation::validate_quantity;
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use std::collections::HashSet;
use uuid::Uuid;

use crate::cart::{Cart, GuestCheckIn};
use crate::error::ValidationError;
use crate::types::Guest;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

pub use crate::error::ValidationResult;

// =============================================================================
// Structural Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::NonPositiveQuantity {
            product_id: Uuid::nil(),
            quantity: qty,
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::QuantityTooLarge {
            requested: qty,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the shape of a cart before anything is fetched.
///
/// `settles_remotely` selects the operation: `true` for a pending card-terminal
/// purchase, `false` for a purchase confirmed at the point of sale.
pub fn validate_cart(cart: &Cart, settles_remotely: bool) -> ValidationResult<()> {
    if cart.payment_method.settles_remotely() != settles_remotely {
        return Err(ValidationError::InvalidPaymentMethod {
            method: cart.payment_method,
        });
    }

    if cart.lines.is_empty() {
        return Err(ValidationError::EmptyCart);
    }

    if cart.lines.len() > MAX_CART_LINES {
        return Err(ValidationError::CartTooLarge { max: MAX_CART_LINES });
    }

    if cart.total_net_price.is_negative() {
        return Err(ValidationError::NegativeTotal {
            field: "totalNetPrice".to_string(),
        });
    }
    if cart.total_gross_price.is_negative() {
        return Err(ValidationError::NegativeTotal {
            field: "totalGrossPrice".to_string(),
        });
    }

    let mut products = HashSet::with_capacity(cart.lines.len());
    let mut guests = HashSet::new();
    for line in &cart.lines {
        validate_quantity(line.quantity).map_err(|err| match err {
            ValidationError::NonPositiveQuantity { quantity, .. } => {
                ValidationError::NonPositiveQuantity {
                    product_id: line.product_id,
                    quantity,
                }
            }
            other => other,
        })?;

        if !products.insert(line.product_id) {
            return Err(ValidationError::DuplicateProduct(line.product_id));
        }

        for check_in in &line.guests {
            if !guests.insert(check_in.guest_id) {
                return Err(ValidationError::DuplicateGuest(check_in.guest_id));
            }
        }
    }

    Ok(())
}

// =============================================================================
// Guest Eligibility
// =============================================================================

/// Checks that a fetched guest may be checked in on a line of `product_id`.
///
/// ## Order of Checks
/// 1. `GuestNotFound` when `guest` is `None`
/// 2. `GuestAlreadyAttended`
/// 3. `TooManyAdditionalGuests` (attendees in `1..=additional_guests + 1`)
/// 4. `ListItemWrongProduct`
pub fn validate_guest_check_in(
    guest: Option<&Guest>,
    check_in: &GuestCheckIn,
    product_id: Uuid,
) -> ValidationResult<()> {
    let guest = guest.ok_or(ValidationError::GuestNotFound(check_in.guest_id))?;

    if guest.has_attended() {
        return Err(ValidationError::GuestAlreadyAttended(guest.id));
    }

    if check_in.attendees == 0 {
        return Err(ValidationError::InvalidField {
            field: "attendees".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if check_in.attendees > guest.max_attendees() {
        return Err(ValidationError::TooManyAdditionalGuests {
            guest_id: guest.id,
            allowed: guest.max_attendees(),
            requested: check_in.attendees,
        });
    }

    if guest.product_id != product_id {
        return Err(ValidationError::ListItemWrongProduct {
            guest_id: guest.id,
            product_id,
        });
    }

    Ok(())
}

/// Validates a UUID format.
///
/// ## Example
/// ```rust
/// use boxoffice_core::validation::parse_uuid;
///
/// assert!(parse_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(parse_uuid("id", "not-a-uuid").is_err());
/// ```
pub fn parse_uuid(field: &str, value: &str) -> ValidationResult<Uuid> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }

    Uuid::parse_str(value).map_err(|_| ValidationError::InvalidField {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartLine;
    use crate::money::Money;
    use crate::types::PaymentMethod;

    fn line(product_id: Uuid, quantity: i64, guests: Vec<GuestCheckIn>) -> CartLine {
        CartLine {
            product_id,
            quantity,
            net_price: Money::from_cents(1000),
            guests,
        }
    }

    fn cart(method: PaymentMethod, lines: Vec<CartLine>) -> Cart {
        Cart {
            payment_method: method,
            total_net_price: Money::from_cents(1000),
            total_gross_price: Money::from_cents(1070),
            lines,
            terminal_id: None,
        }
    }

    fn guest(product_id: Uuid, additional: u32) -> Guest {
        Guest {
            id: Uuid::new_v4(),
            guest_list_id: Uuid::new_v4(),
            product_id,
            name: "Ada".to_string(),
            notification_address: None,
            additional_guests: additional,
            attended_guests: 0,
            arrived_at: None,
            purchase_id: None,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_empty_cart() {
        assert_eq!(
            validate_cart(&cart(PaymentMethod::Cash, vec![]), false),
            Err(ValidationError::EmptyCart)
        );
    }

    #[test]
    fn test_payment_method_must_match_operation() {
        let p = Uuid::new_v4();
        let card = cart(PaymentMethod::CardTerminal, vec![line(p, 1, vec![])]);
        assert!(validate_cart(&card, true).is_ok());
        assert!(matches!(
            validate_cart(&card, false),
            Err(ValidationError::InvalidPaymentMethod { .. })
        ));

        let voucher = cart(PaymentMethod::Voucher, vec![line(p, 1, vec![])]);
        assert!(validate_cart(&voucher, false).is_ok());
        assert!(validate_cart(&voucher, true).is_err());
    }

    #[test]
    fn test_duplicate_product_and_guest() {
        let p = Uuid::new_v4();
        let dup = cart(PaymentMethod::Cash, vec![line(p, 1, vec![]), line(p, 2, vec![])]);
        assert_eq!(validate_cart(&dup, false), Err(ValidationError::DuplicateProduct(p)));

        let g = GuestCheckIn {
            guest_id: Uuid::new_v4(),
            attendees: 1,
        };
        let dup_guest = cart(
            PaymentMethod::Cash,
            vec![line(p, 1, vec![g]), line(Uuid::new_v4(), 1, vec![g])],
        );
        assert_eq!(
            validate_cart(&dup_guest, false),
            Err(ValidationError::DuplicateGuest(g.guest_id))
        );
    }

    #[test]
    fn test_non_positive_quantity_names_product() {
        let p = Uuid::new_v4();
        assert_eq!(
            validate_cart(&cart(PaymentMethod::Cash, vec![line(p, 0, vec![])]), false),
            Err(ValidationError::NonPositiveQuantity {
                product_id: p,
                quantity: 0
            })
        );
    }

    #[test]
    fn test_negative_claimed_total() {
        let mut c = cart(PaymentMethod::Cash, vec![line(Uuid::new_v4(), 1, vec![])]);
        c.total_gross_price = Money::from_cents(-1);
        assert!(matches!(
            validate_cart(&c, false),
            Err(ValidationError::NegativeTotal { .. })
        ));
    }

    #[test]
    fn test_guest_attendee_limit() {
        let product = Uuid::new_v4();
        let g = guest(product, 1);

        let two = GuestCheckIn { guest_id: g.id, attendees: 2 };
        assert!(validate_guest_check_in(Some(&g), &two, product).is_ok());

        let three = GuestCheckIn { guest_id: g.id, attendees: 3 };
        assert_eq!(
            validate_guest_check_in(Some(&g), &three, product),
            Err(ValidationError::TooManyAdditionalGuests {
                guest_id: g.id,
                allowed: 2,
                requested: 3
            })
        );
    }

    #[test]
    fn test_guest_already_attended_and_missing() {
        let product = Uuid::new_v4();
        let mut g = guest(product, 0);
        let check_in = GuestCheckIn { guest_id: g.id, attendees: 1 };

        assert_eq!(
            validate_guest_check_in(None, &check_in, product),
            Err(ValidationError::GuestNotFound(g.id))
        );

        g.attended_guests = 1;
        assert_eq!(
            validate_guest_check_in(Some(&g), &check_in, product),
            Err(ValidationError::GuestAlreadyAttended(g.id))
        );
    }

    #[test]
    fn test_guest_wrong_product() {
        let g = guest(Uuid::new_v4(), 0);
        let other = Uuid::new_v4();
        let check_in = GuestCheckIn { guest_id: g.id, attendees: 1 };
        assert_eq!(
            validate_guest_check_in(Some(&g), &check_in, other),
            Err(ValidationError::ListItemWrongProduct {
                guest_id: g.id,
                product_id: other
            })
        );
    }

    #[test]
    fn test_parse_uuid() {
        assert!(parse_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(matches!(parse_uuid("id", ""), Err(ValidationError::MissingField { .. })));
        assert!(matches!(
            parse_uuid("id", "not-a-uuid"),
            Err(ValidationError::InvalidField { .. })
        ));
    }
}
