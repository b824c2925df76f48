//! # Cart Pricing
//!
//! The cart is what a client submits to ring up a sale. Prices and totals in
//! it are *claims*: the server recomputes everything from authoritative
//! product data and only accepts the cart when the claims match exactly.
//!
//! ## Pricing Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each CartLine:                                                     │
//! │    unit_net   = round(product.net_price, dp)  ── must equal line price  │
//! │    line_net   = unit_net × quantity                                     │
//! │    line_gross = line_net × (1 + vat)          (unrounded)               │
//! │                                                                         │
//! │  total_net   = Σ line_net                     ── must equal claim       │
//! │  total_gross = round(Σ line_gross, dp)        ── must equal claim       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Gross is rounded exactly once, on the total. Rounding each line first
//! drifts by a cent on multi-line carts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::types::{LineItem, PaymentMethod, Product};

// =============================================================================
// Cart (client submission)
// =============================================================================

/// A cart as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Cart {
    pub payment_method: PaymentMethod,
    /// Claimed total net price.
    pub total_net_price: Money,
    /// Claimed total gross price.
    pub total_gross_price: Money,
    pub lines: Vec<CartLine>,
    /// Card terminal to charge. Falls back to the configured default.
    #[serde(default)]
    pub terminal_id: Option<String>,
}

/// One product line of a cart.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartLine {
    #[ts(as = "String")]
    pub product_id: Uuid,
    pub quantity: i64,
    /// Claimed unit net price.
    pub net_price: Money,
    #[serde(default)]
    pub guests: Vec<GuestCheckIn>,
}

/// A guest-list entry the line wants to check in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GuestCheckIn {
    #[ts(as = "String")]
    pub guest_id: Uuid,
    /// Number of people arriving on this entry, the guest included.
    pub attendees: u32,
}

impl Cart {
    /// Iterates over every check-in together with the product of its line.
    pub fn check_ins(&self) -> impl Iterator<Item = (Uuid, &GuestCheckIn)> {
        self.lines
            .iter()
            .flat_map(|line| line.guests.iter().map(move |g| (line.product_id, g)))
    }
}

// =============================================================================
// Priced Cart (server computed)
// =============================================================================

/// The server's view of a cart after pricing succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub line_items: Vec<LineItem>,
    pub total_net_price: Money,
    pub total_gross_price: Money,
}

/// Prices one cart line against its authoritative product.
pub fn price_line(
    product: &Product,
    line: &CartLine,
    decimal_places: u32,
) -> ValidationResult<LineItem> {
    let unit_net = product.net_price.round_dp(decimal_places);
    if unit_net != line.net_price {
        return Err(ValidationError::InvalidProductPrice {
            product_id: product.id,
            expected: unit_net,
            submitted: line.net_price,
        });
    }

    Ok(LineItem {
        product_id: product.id,
        quantity: line.quantity,
        net_price: unit_net,
        vat_rate: product.vat_rate,
    })
}

/// Prices a whole cart and checks the claimed totals.
///
/// `products` must hold every product the cart references; a missing entry
/// is reported as `ProductNotFound`.
pub fn price_cart(
    cart: &Cart,
    products: &HashMap<Uuid, Product>,
    decimal_places: u32,
) -> ValidationResult<PricedCart> {
    let mut line_items = Vec::with_capacity(cart.lines.len());
    for line in &cart.lines {
        let product = products
            .get(&line.product_id)
            .ok_or(ValidationError::ProductNotFound(line.product_id))?;
        line_items.push(price_line(product, line, decimal_places)?);
    }

    let total_net_price: Money = line_items.iter().map(LineItem::net_total).sum();
    let total_gross_price = line_items
        .iter()
        .map(LineItem::gross_total)
        .sum::<Money>()
        .round_dp(decimal_places);

    if total_net_price.is_negative() {
        return Err(ValidationError::NegativeTotal {
            field: "totalNetPrice".to_string(),
        });
    }
    if total_gross_price.is_negative() {
        return Err(ValidationError::NegativeTotal {
            field: "totalGrossPrice".to_string(),
        });
    }

    if total_net_price != cart.total_net_price {
        return Err(ValidationError::InvalidTotalNetPrice {
            expected: total_net_price,
            submitted: cart.total_net_price,
        });
    }
    if total_gross_price != cart.total_gross_price {
        return Err(ValidationError::InvalidTotalGrossPrice {
            expected: total_gross_price,
            submitted: cart.total_gross_price,
        });
    }

    Ok(PricedCart {
        line_items,
        total_net_price,
        total_gross_price,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VatRate;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product(net: Money, vat_bps: u32) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Day Ticket".to_string(),
            net_price: net,
            vat_rate: VatRate::from_bps(vat_bps),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn cart(lines: Vec<CartLine>, net: Money, gross: Money) -> Cart {
        Cart {
            payment_method: PaymentMethod::Cash,
            total_net_price: net,
            total_gross_price: gross,
            lines,
            terminal_id: None,
        }
    }

    fn line(product: &Product, quantity: i64, net: Money) -> CartLine {
        CartLine {
            product_id: product.id,
            quantity,
            net_price: net,
            guests: vec![],
        }
    }

    fn catalog(products: &[&Product]) -> HashMap<Uuid, Product> {
        products.iter().map(|p| (p.id, (*p).clone())).collect()
    }

    #[test]
    fn test_total_integrity_at_seven_percent() {
        // Gross ticket price 40.00 stored net with full precision
        let ticket = product(Money::new(dec!(40.00) / dec!(1.07)), 700);
        let products = catalog(&[&ticket]);

        let ok = cart(
            vec![line(&ticket, 1, Money::from_cents(3738))],
            Money::from_cents(3738),
            Money::from_cents(4000),
        );
        let priced = price_cart(&ok, &products, 2).unwrap();
        assert_eq!(priced.total_net_price, Money::from_cents(3738));
        assert_eq!(priced.total_gross_price, Money::from_cents(4000));
        assert_eq!(priced.line_items[0].net_price, Money::from_cents(3738));

        let bad_gross = cart(
            vec![line(&ticket, 1, Money::from_cents(3738))],
            Money::from_cents(3738),
            Money::from_cents(3999),
        );
        assert!(matches!(
            price_cart(&bad_gross, &products, 2),
            Err(ValidationError::InvalidTotalGrossPrice { .. })
        ));

        let bad_net = cart(
            vec![line(&ticket, 1, Money::from_cents(3738))],
            Money::from_cents(3739),
            Money::from_cents(4000),
        );
        assert!(matches!(
            price_cart(&bad_net, &products, 2),
            Err(ValidationError::InvalidTotalNetPrice { .. })
        ));
    }

    #[test]
    fn test_price_off_by_one_cent_rejected() {
        let ticket = product(Money::from_cents(1869), 700);
        let products = catalog(&[&ticket]);
        let stale = cart(
            vec![line(&ticket, 2, Money::from_cents(1868))],
            Money::from_cents(3736),
            Money::from_cents(3998),
        );

        match price_cart(&stale, &products, 2) {
            Err(ValidationError::InvalidProductPrice { expected, submitted, .. }) => {
                assert_eq!(expected, Money::from_cents(1869));
                assert_eq!(submitted, Money::from_cents(1868));
            }
            other => panic!("expected InvalidProductPrice, got {other:?}"),
        }
    }

    #[test]
    fn test_gross_rounded_once_over_all_lines() {
        // 0.50 × 1.07 = 0.535 per line. Rounding per line would give 1.08.
        let a = product(Money::from_cents(50), 700);
        let b = product(Money::from_cents(50), 700);
        let products = catalog(&[&a, &b]);
        let submitted = cart(
            vec![
                line(&a, 1, Money::from_cents(50)),
                line(&b, 1, Money::from_cents(50)),
            ],
            Money::from_cents(100),
            Money::from_cents(107),
        );

        let priced = price_cart(&submitted, &products, 2).unwrap();
        assert_eq!(priced.total_gross_price, Money::from_cents(107));
    }

    #[test]
    fn test_unknown_product() {
        let ticket = product(Money::from_cents(1000), 700);
        let submitted = cart(
            vec![line(&ticket, 1, Money::from_cents(1000))],
            Money::from_cents(1000),
            Money::from_cents(1070),
        );
        assert_eq!(
            price_cart(&submitted, &HashMap::new(), 2),
            Err(ValidationError::ProductNotFound(ticket.id))
        );
    }

    #[test]
    fn test_cart_deserializes_from_camel_case() {
        let json = r#"{
            "paymentMethod": "card_terminal",
            "totalNetPrice": "37.38",
            "totalGrossPrice": "40.00",
            "lines": [{
                "productId": "00000000-0000-0000-0000-000000000001",
                "quantity": 1,
                "netPrice": "37.38",
                "guests": [{"guestId": "00000000-0000-0000-0000-000000000002", "attendees": 2}]
            }]
        }"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert_eq!(cart.payment_method, PaymentMethod::CardTerminal);
        assert_eq!(cart.terminal_id, None);
        assert_eq!(cart.check_ins().count(), 1);
        assert_eq!(cart.lines[0].guests[0].attendees, 2);
    }
}
