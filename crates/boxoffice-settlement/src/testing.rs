//! Shared fixtures for the settlement tests.

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use boxoffice_core::{
    Cart, CartLine, Guest, GuestCheckIn, GuestList, Money, Operator, OperatorRole, PaymentMethod,
    Product, VatRate,
};
use boxoffice_db::{Database, DbConfig};

/// One ticket product (40.00 gross at 7%) with a guest list of two, and a
/// matinee product (12.00 net at 19%) with a guest list of one.
pub(crate) struct Fixture {
    pub(crate) db: Database,
    pub(crate) product: Product,
    /// `guests[0]` may bring one companion and has an address, `guests[1]` neither.
    pub(crate) guests: Vec<Uuid>,
    pub(crate) matinee: Product,
    pub(crate) matinee_guest: Uuid,
    pub(crate) operator: Operator,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let product = Product {
            id: Uuid::new_v4(),
            name: "Evening Ticket".to_string(),
            net_price: Money::new(dec!(40.00) / dec!(1.07)),
            vat_rate: VatRate::from_bps(700),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();

        let matinee = Product {
            id: Uuid::new_v4(),
            name: "Matinee Ticket".to_string(),
            net_price: Money::new(dec!(12.00)),
            vat_rate: VatRate::from_bps(1900),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&matinee).await.unwrap();

        let guests = insert_guests(
            &db,
            &product,
            "Press",
            &[("Grace Hopper", Some("grace@example.com"), 1), ("Alan Turing", None, 0)],
        )
        .await;
        let matinee_guests = insert_guests(&db, &matinee, "Crew", &[("Ada Lovelace", None, 0)]).await;

        Fixture {
            db,
            product,
            guests,
            matinee,
            matinee_guest: matinee_guests[0],
            operator: Operator::new(Uuid::new_v4(), OperatorRole::Operator),
        }
    }

    pub(crate) async fn purchase_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}

async fn insert_guests(
    db: &Database,
    product: &Product,
    list_name: &str,
    guests: &[(&str, Option<&str>, u32)],
) -> Vec<Uuid> {
    let list = GuestList {
        id: Uuid::new_v4(),
        product_id: product.id,
        name: list_name.to_string(),
    };
    db.guests().insert_list(&list).await.unwrap();

    let mut ids = Vec::new();
    for &(name, address, additional) in guests {
        let guest = Guest {
            id: Uuid::new_v4(),
            guest_list_id: list.id,
            product_id: product.id,
            name: name.to_string(),
            notification_address: address.map(str::to_string),
            additional_guests: additional,
            attended_guests: 0,
            arrived_at: None,
            purchase_id: None,
        };
        db.guests().insert(&guest).await.unwrap();
        ids.push(guest.id);
    }
    ids
}

/// A correctly priced cart of `quantity` tickets.
pub(crate) fn cart(
    fx: &Fixture,
    payment_method: PaymentMethod,
    quantity: i64,
    guests: Vec<GuestCheckIn>,
) -> Cart {
    cart_of(payment_method, vec![(&fx.product, quantity, guests)])
}

/// A correctly priced cart with one line per `(product, quantity, guests)`.
pub(crate) fn cart_of(
    payment_method: PaymentMethod,
    lines: Vec<(&Product, i64, Vec<GuestCheckIn>)>,
) -> Cart {
    let mut total_net_price = Money::zero();
    let mut total_gross_price = Money::zero();
    let mut cart_lines = Vec::with_capacity(lines.len());

    for (product, quantity, guests) in lines {
        let unit = product.net_price.round_dp(2);
        let net = unit.multiply_quantity(quantity);
        total_net_price += net;
        total_gross_price += net.with_vat(product.vat_rate);
        cart_lines.push(CartLine {
            product_id: product.id,
            quantity,
            net_price: unit,
            guests,
        });
    }

    Cart {
        payment_method,
        total_net_price,
        total_gross_price: total_gross_price.round_dp(2),
        lines: cart_lines,
        terminal_id: None,
    }
}

pub(crate) fn check_in(guest_id: Uuid, attendees: u32) -> GuestCheckIn {
    GuestCheckIn {
        guest_id,
        attendees,
    }
}
