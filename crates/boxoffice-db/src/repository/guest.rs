//! # Guest Repository
//!
//! Guest lists and guest check-in state.
//!
//! Check-in and rollback writes live in [`PurchaseRepository`] because they
//! must share the purchase's transaction. This repository only reads guests
//! and inserts new entries.
//!
//! [`PurchaseRepository`]: crate::repository::purchase::PurchaseRepository

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use boxoffice_core::{Guest, GuestList};

use super::decode_count;
use crate::error::{DbError, DbResult};

/// `guests` row joined with the owning list's product.
#[derive(Debug, sqlx::FromRow)]
struct GuestRecord {
    id: Uuid,
    guest_list_id: Uuid,
    product_id: Uuid,
    name: String,
    notification_address: Option<String>,
    additional_guests: i64,
    attended_guests: i64,
    arrived_at: Option<DateTime<Utc>>,
    purchase_id: Option<Uuid>,
}

impl TryFrom<GuestRecord> for Guest {
    type Error = DbError;

    fn try_from(record: GuestRecord) -> DbResult<Self> {
        Ok(Guest {
            id: record.id,
            guest_list_id: record.guest_list_id,
            product_id: record.product_id,
            name: record.name,
            notification_address: record.notification_address,
            additional_guests: decode_count("guests.additional_guests", record.additional_guests)?,
            attended_guests: decode_count("guests.attended_guests", record.attended_guests)?,
            arrived_at: record.arrived_at,
            purchase_id: record.purchase_id,
        })
    }
}

const SELECT_GUEST: &str = r#"
    SELECT
        g.id,
        g.guest_list_id,
        l.product_id,
        g.name,
        g.notification_address,
        g.additional_guests,
        g.attended_guests,
        g.arrived_at,
        g.purchase_id
    FROM guests g
    INNER JOIN guest_lists l ON l.id = g.guest_list_id
"#;

/// Repository for guest list database operations.
#[derive(Debug, Clone)]
pub struct GuestRepository {
    pool: SqlitePool,
}

impl GuestRepository {
    /// Creates a new GuestRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GuestRepository { pool }
    }

    /// Gets a guest by ID, including the product of its list.
    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Guest>> {
        let sql = format!("{SELECT_GUEST} WHERE g.id = ?1");
        let record = sqlx::query_as::<_, GuestRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Guest::try_from).transpose()
    }

    /// Lists the guests a purchase has checked in.
    pub async fn list_by_purchase(&self, purchase_id: Uuid) -> DbResult<Vec<Guest>> {
        let sql = format!("{SELECT_GUEST} WHERE g.purchase_id = ?1 ORDER BY g.name");
        let records = sqlx::query_as::<_, GuestRecord>(&sql)
            .bind(purchase_id)
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(Guest::try_from).collect()
    }

    /// Inserts a guest list.
    pub async fn insert_list(&self, list: &GuestList) -> DbResult<()> {
        debug!(id = %list.id, product_id = %list.product_id, "Inserting guest list");

        sqlx::query(
            r#"
            INSERT INTO guest_lists (id, product_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(list.id)
        .bind(list.product_id)
        .bind(&list.name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a guest. `product_id` on the guest is ignored; it comes from the list.
    pub async fn insert(&self, guest: &Guest) -> DbResult<()> {
        debug!(id = %guest.id, list_id = %guest.guest_list_id, "Inserting guest");

        sqlx::query(
            r#"
            INSERT INTO guests (
                id, guest_list_id, name, notification_address,
                additional_guests, attended_guests, arrived_at, purchase_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(guest.id)
        .bind(guest.guest_list_id)
        .bind(&guest.name)
        .bind(&guest.notification_address)
        .bind(i64::from(guest.additional_guests))
        .bind(i64::from(guest.attended_guests))
        .bind(guest.arrived_at)
        .bind(guest.purchase_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
