//! # Seed Data Generator
//!
//! Populates the database with demo products, guest lists and guests for
//! local development against the mock gateway.
//!
//! ## Usage
//! ```bash
//! # Seed ./boxoffice_dev.db with 20 guests per list (default)
//! cargo run -p boxoffice-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p boxoffice-db --bin seed -- --guests 200 --db ./data/boxoffice.db
//! ```
//!
//! ## Generated Data
//! Product prices are entered *gross* (what is printed on the ticket) and
//! stored *net* with full precision, the same way the back office does it.

use chrono::Utc;
use rust_decimal::Decimal;
use std::env;
use uuid::Uuid;

use boxoffice_core::{Guest, GuestList, Money, Product, VatRate};
use boxoffice_db::{Database, DbConfig};

/// (name, gross price in cents, VAT in bps)
const PRODUCTS: &[(&str, i64, u32)] = &[
    ("Evening Ticket", 4000, 700),
    ("Matinee Ticket", 2500, 700),
    ("Backstage Pass", 9900, 700),
    ("Programme Booklet", 800, 700),
    ("Tote Bag", 1500, 1900),
    ("Cloakroom", 200, 1900),
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Frances", "Ken", "Margaret", "Dennis",
];

const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Allen", "Thompson", "Hamilton",
    "Ritchie",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut guests_per_list: usize = 20;
    let mut db_path = String::from("./boxoffice_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--guests" | "-g" => {
                if i + 1 < args.len() {
                    guests_per_list = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Box Office Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -g, --guests <N>   Guests per ticket guest list (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ./boxoffice_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Box Office Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let mut seeded_guests = 0;
    for (index, (name, gross_cents, vat_bps)) in PRODUCTS.iter().enumerate() {
        let product = generate_product(name, *gross_cents, *vat_bps);
        db.products().insert(&product).await?;
        println!(
            "  {:<20} net {:>12} gross {:>6}",
            product.name,
            product.net_price.round_dp(4),
            product.net_price.with_vat(product.vat_rate).round_dp(2)
        );

        if !name.ends_with("Ticket") && !name.ends_with("Pass") {
            continue;
        }

        let list = GuestList {
            id: Uuid::new_v4(),
            product_id: product.id,
            name: format!("{} guest list", name),
        };
        db.guests().insert_list(&list).await?;

        for n in 0..guests_per_list {
            let guest = generate_guest(&list, index * 1000 + n);
            if let Err(e) = db.guests().insert(&guest).await {
                eprintln!("Failed to insert guest {}: {}", guest.name, e);
                continue;
            }
            seeded_guests += 1;
        }
    }

    println!();
    println!("✓ Seeded {} products and {} guests", PRODUCTS.len(), seeded_guests);

    Ok(())
}

/// Derives the authoritative net price from a gross ticket price.
fn generate_product(name: &str, gross_cents: i64, vat_bps: u32) -> Product {
    let now = Utc::now();
    let vat_rate = VatRate::from_bps(vat_bps);
    let net = Decimal::new(gross_cents, 2) / vat_rate.multiplier();

    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        net_price: Money::new(net),
        vat_rate,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn generate_guest(list: &GuestList, seed: usize) -> Guest {
    let first = FIRST_NAMES[seed % FIRST_NAMES.len()];
    let last = LAST_NAMES[(seed / FIRST_NAMES.len()) % LAST_NAMES.len()];

    Guest {
        id: Uuid::new_v4(),
        guest_list_id: list.id,
        product_id: list.product_id,
        name: format!("{} {}", first, last),
        notification_address: (seed % 3 == 0)
            .then(|| format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase())),
        additional_guests: (seed % 3) as u32,
        attended_guests: 0,
        arrived_at: None,
        purchase_id: None,
    }
}
