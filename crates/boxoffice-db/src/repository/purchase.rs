//! # Purchase Repository
//!
//! Purchases, their line items, and the guest check-ins that ride along in
//! the same transaction.
//!
//! ## Transaction Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_with_check_ins                                                  │
//! │    BEGIN                                                                │
//! │      INSERT purchases                                                   │
//! │      INSERT purchase_line_items × n                                     │
//! │      UPDATE guests ... WHERE id = ? AND attended_guests = 0   × m       │
//! │        (0 rows → Conflict, whole transaction rolls back)                │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  transition_status(id, from, to, release_guests)                        │
//! │    BEGIN                                                                │
//! │      UPDATE purchases SET status = to WHERE id = ? AND status = from    │
//! │        (0 rows → someone else won, nothing else happens)                │
//! │      UPDATE guests SET attended_guests = 0 ... WHERE purchase_id = ?    │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  delete_with_rollback                                                   │
//! │    BEGIN                                                                │
//! │      UPDATE guests (release) / DELETE line items / DELETE purchase      │
//! │    COMMIT                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The conditional `WHERE status = from` is what makes two racing paths
//! (the polling loop and a webhook) safe: exactly one of them changes the
//! row, the other observes zero affected rows.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use boxoffice_core::{GuestCheckIn, LineItem, PaymentMethod, Purchase, PurchaseStatus};

use super::{decode_money, decode_vat_rate};
use crate::error::{DbError, DbResult};

// =============================================================================
// Row Records
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRecord {
    id: Uuid,
    status: PurchaseStatus,
    payment_method: PaymentMethod,
    total_net_price: String,
    total_gross_price: String,
    gateway_charge_ref: Option<String>,
    gateway_transaction_ref: Option<String>,
    terminal_id: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRecord {
    product_id: Uuid,
    quantity: i64,
    net_price: String,
    vat_rate_bps: i64,
}

impl TryFrom<LineItemRecord> for LineItem {
    type Error = DbError;

    fn try_from(record: LineItemRecord) -> DbResult<Self> {
        Ok(LineItem {
            product_id: record.product_id,
            quantity: record.quantity,
            net_price: decode_money("purchase_line_items.net_price", &record.net_price)?,
            vat_rate: decode_vat_rate("purchase_line_items.vat_rate_bps", record.vat_rate_bps)?,
        })
    }
}

impl PurchaseRecord {
    fn into_purchase(self, line_items: Vec<LineItem>) -> DbResult<Purchase> {
        Ok(Purchase {
            id: self.id,
            status: self.status,
            payment_method: self.payment_method,
            total_net_price: decode_money("purchases.total_net_price", &self.total_net_price)?,
            total_gross_price: decode_money("purchases.total_gross_price", &self.total_gross_price)?,
            line_items,
            gateway_charge_ref: self.gateway_charge_ref,
            gateway_transaction_ref: self.gateway_transaction_ref,
            terminal_id: self.terminal_id,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_PURCHASE: &str = r#"
    SELECT
        id, status, payment_method,
        total_net_price, total_gross_price,
        gateway_charge_ref, gateway_transaction_ref, terminal_id,
        created_by, created_at, updated_at
    FROM purchases
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for purchase database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Inserts a purchase with its line items and claims every guest, atomically.
    ///
    /// ## Returns
    /// * `Err(DbError::Conflict { entity: "Guest", .. })` - a guest was already
    ///   claimed (possibly by a concurrent purchase); nothing was written
    pub async fn create_with_check_ins(
        &self,
        purchase: &Purchase,
        check_ins: &[GuestCheckIn],
    ) -> DbResult<()> {
        debug!(
            id = %purchase.id,
            status = %purchase.status,
            lines = purchase.line_items.len(),
            guests = check_ins.len(),
            "Creating purchase"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, status, payment_method,
                total_net_price, total_gross_price,
                gateway_charge_ref, gateway_transaction_ref, terminal_id,
                created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(purchase.id)
        .bind(purchase.status)
        .bind(purchase.payment_method)
        .bind(purchase.total_net_price.to_string())
        .bind(purchase.total_gross_price.to_string())
        .bind(&purchase.gateway_charge_ref)
        .bind(&purchase.gateway_transaction_ref)
        .bind(&purchase.terminal_id)
        .bind(purchase.created_by)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in purchase.line_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO purchase_line_items (
                    purchase_id, position, product_id, quantity, net_price, vat_rate_bps
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(purchase.id)
            .bind(position as i64)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.net_price.to_string())
            .bind(i64::from(item.vat_rate.bps()))
            .execute(&mut *tx)
            .await?;
        }

        for check_in in check_ins {
            let claimed = sqlx::query(
                r#"
                UPDATE guests SET
                    attended_guests = ?2,
                    arrived_at = ?3,
                    purchase_id = ?4
                WHERE id = ?1 AND attended_guests = 0
                "#,
            )
            .bind(check_in.guest_id)
            .bind(i64::from(check_in.attendees))
            .bind(purchase.created_at)
            .bind(purchase.id)
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() == 0 {
                // Dropping `tx` rolls back everything above
                return Err(DbError::conflict("Guest", check_in.guest_id));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a purchase with its line items.
    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Purchase>> {
        let sql = format!("{SELECT_PURCHASE} WHERE id = ?1");
        let record = sqlx::query_as::<_, PurchaseRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) => {
                let items = self.line_items(record.id).await?;
                Ok(Some(record.into_purchase(items)?))
            }
            None => Ok(None),
        }
    }

    /// Gets the purchase a gateway charge reference belongs to.
    pub async fn get_by_charge_ref(&self, charge_ref: &str) -> DbResult<Option<Purchase>> {
        let sql = format!("{SELECT_PURCHASE} WHERE gateway_charge_ref = ?1");
        let record = sqlx::query_as::<_, PurchaseRecord>(&sql)
            .bind(charge_ref)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) => {
                let items = self.line_items(record.id).await?;
                Ok(Some(record.into_purchase(items)?))
            }
            None => Ok(None),
        }
    }

    /// Lists pending purchases that already have a gateway charge, oldest first.
    ///
    /// Used by the startup sweep that resumes reconciliation.
    pub async fn list_pending_with_charge_ref(&self) -> DbResult<Vec<Purchase>> {
        let sql = format!(
            "{SELECT_PURCHASE} WHERE status = 'pending' AND gateway_charge_ref IS NOT NULL ORDER BY created_at"
        );
        let records = sqlx::query_as::<_, PurchaseRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let mut purchases = Vec::with_capacity(records.len());
        for record in records {
            let items = self.line_items(record.id).await?;
            purchases.push(record.into_purchase(items)?);
        }
        Ok(purchases)
    }

    async fn line_items(&self, purchase_id: Uuid) -> DbResult<Vec<LineItem>> {
        let records = sqlx::query_as::<_, LineItemRecord>(
            r#"
            SELECT product_id, quantity, net_price, vat_rate_bps
            FROM purchase_line_items
            WHERE purchase_id = ?1
            ORDER BY position
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(LineItem::try_from).collect()
    }

    /// Moves a purchase from `from` to `to` if it is still in `from`.
    ///
    /// When `release_guests` is set, every guest linked to the purchase is
    /// reset in the same transaction.
    ///
    /// ## Returns
    /// * `Ok(true)` - this call changed the status
    /// * `Ok(false)` - the purchase was not in `from` (or does not exist)
    pub async fn transition_status(
        &self,
        id: Uuid,
        from: PurchaseStatus,
        to: PurchaseStatus,
        release_guests: bool,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE purchases SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if release_guests {
            let released = release_guests_in(&mut tx, id).await?;
            debug!(id = %id, released, "Released guest check-ins");
        }

        tx.commit().await?;
        debug!(id = %id, from = %from, to = %to, "Purchase status changed");
        Ok(true)
    }

    /// Deletes a purchase, its line items, and releases its guests.
    ///
    /// ## Returns
    /// * `Ok(false)` - no such purchase
    pub async fn delete_with_rollback(&self, id: Uuid) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let released = release_guests_in(&mut tx, id).await?;

        sqlx::query("DELETE FROM purchase_line_items WHERE purchase_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        debug!(id = %id, released, "Purchase deleted");
        Ok(true)
    }

    /// Stores the gateway charge reference and the terminal it was sent to.
    pub async fn set_charge_ref(
        &self,
        id: Uuid,
        charge_ref: &str,
        terminal_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE purchases SET
                gateway_charge_ref = ?2,
                terminal_id = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(charge_ref)
        .bind(terminal_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Purchase", id));
        }

        Ok(())
    }

    /// Stores the transaction reference the gateway assigned on settlement.
    pub async fn set_transaction_ref(&self, id: Uuid, transaction_ref: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE purchases SET gateway_transaction_ref = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(transaction_ref)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Purchase", id));
        }

        Ok(())
    }
}

/// Resets every guest claimed by `purchase_id`. Returns how many were reset.
async fn release_guests_in(tx: &mut Transaction<'_, Sqlite>, purchase_id: Uuid) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE guests SET
            attended_guests = 0,
            arrived_at = NULL,
            purchase_id = NULL
        WHERE purchase_id = ?1
        "#,
    )
    .bind(purchase_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use boxoffice_core::{Guest, GuestList, Money, Product, VatRate};

    struct Fixture {
        db: Database,
        product: Product,
        list: GuestList,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Concert".to_string(),
            net_price: Money::from_cents(3738),
            vat_rate: VatRate::from_bps(700),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.products().insert(&product).await.unwrap();
        let list = GuestList {
            id: Uuid::new_v4(),
            product_id: product.id,
            name: "Friends".to_string(),
        };
        db.guests().insert_list(&list).await.unwrap();
        Fixture { db, product, list }
    }

    impl Fixture {
        async fn guest(&self, additional: u32) -> Guest {
            let guest = Guest {
                id: Uuid::new_v4(),
                guest_list_id: self.list.id,
                product_id: self.product.id,
                name: "Guest".to_string(),
                notification_address: None,
                additional_guests: additional,
                attended_guests: 0,
                arrived_at: None,
                purchase_id: None,
            };
            self.db.guests().insert(&guest).await.unwrap();
            guest
        }

        fn purchase(&self, status: PurchaseStatus, method: PaymentMethod) -> Purchase {
            let now = Utc::now();
            Purchase {
                id: Uuid::now_v7(),
                status,
                payment_method: method,
                total_net_price: Money::from_cents(3738),
                total_gross_price: Money::from_cents(4000),
                line_items: vec![LineItem {
                    product_id: self.product.id,
                    quantity: 1,
                    net_price: Money::from_cents(3738),
                    vat_rate: VatRate::from_bps(700),
                }],
                gateway_charge_ref: None,
                gateway_transaction_ref: None,
                terminal_id: None,
                created_by: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
            }
        }
    }

    #[tokio::test]
    async fn test_create_and_load_round_trip() {
        let f = fixture().await;
        let guest = f.guest(1).await;
        let purchase = f.purchase(PurchaseStatus::Confirmed, PaymentMethod::Cash);
        let check_in = GuestCheckIn { guest_id: guest.id, attendees: 2 };

        f.db.purchases()
            .create_with_check_ins(&purchase, &[check_in])
            .await
            .unwrap();

        let loaded = f.db.purchases().get_by_id(purchase.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PurchaseStatus::Confirmed);
        assert_eq!(loaded.total_gross_price, Money::from_cents(4000));
        assert_eq!(loaded.line_items, purchase.line_items);

        let guest = f.db.guests().get_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(guest.attended_guests, 2);
        assert_eq!(guest.purchase_id, Some(purchase.id));
        assert!(guest.arrived_at.is_some());
    }

    #[tokio::test]
    async fn test_claimed_guest_aborts_whole_transaction() {
        let f = fixture().await;
        let guest = f.guest(0).await;
        let check_in = GuestCheckIn { guest_id: guest.id, attendees: 1 };

        let first = f.purchase(PurchaseStatus::Confirmed, PaymentMethod::Cash);
        f.db.purchases()
            .create_with_check_ins(&first, &[check_in])
            .await
            .unwrap();

        let second = f.purchase(PurchaseStatus::Confirmed, PaymentMethod::Cash);
        let err = f
            .db
            .purchases()
            .create_with_check_ins(&second, &[check_in])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        assert!(f.db.purchases().get_by_id(second.id).await.unwrap().is_none());
        let guest = f.db.guests().get_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(guest.purchase_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let f = fixture().await;
        let guest = f.guest(0).await;
        let purchase = f.purchase(PurchaseStatus::Pending, PaymentMethod::CardTerminal);
        let check_in = GuestCheckIn { guest_id: guest.id, attendees: 1 };
        f.db.purchases()
            .create_with_check_ins(&purchase, &[check_in])
            .await
            .unwrap();

        let repo = f.db.purchases();
        assert!(repo
            .transition_status(purchase.id, PurchaseStatus::Pending, PurchaseStatus::Failed, true)
            .await
            .unwrap());
        assert!(!repo
            .transition_status(purchase.id, PurchaseStatus::Pending, PurchaseStatus::Confirmed, false)
            .await
            .unwrap());

        let loaded = repo.get_by_id(purchase.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PurchaseStatus::Failed);

        let guest = f.db.guests().get_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(guest.attended_guests, 0);
        assert_eq!(guest.arrived_at, None);
        assert_eq!(guest.purchase_id, None);
    }

    #[tokio::test]
    async fn test_delete_releases_both_guests() {
        let f = fixture().await;
        let a = f.guest(0).await;
        let b = f.guest(3).await;
        let purchase = f.purchase(PurchaseStatus::Confirmed, PaymentMethod::Voucher);
        f.db.purchases()
            .create_with_check_ins(
                &purchase,
                &[
                    GuestCheckIn { guest_id: a.id, attendees: 1 },
                    GuestCheckIn { guest_id: b.id, attendees: 4 },
                ],
            )
            .await
            .unwrap();

        assert!(f.db.purchases().delete_with_rollback(purchase.id).await.unwrap());
        assert!(!f.db.purchases().delete_with_rollback(purchase.id).await.unwrap());
        assert!(f.db.purchases().get_by_id(purchase.id).await.unwrap().is_none());

        for id in [a.id, b.id] {
            let guest = f.db.guests().get_by_id(id).await.unwrap().unwrap();
            assert_eq!(guest.attended_guests, 0);
            assert_eq!(guest.arrived_at, None);
            assert_eq!(guest.purchase_id, None);
        }
    }

    #[tokio::test]
    async fn test_charge_refs_and_pending_sweep() {
        let f = fixture().await;
        let repo = f.db.purchases();
        let with_charge = f.purchase(PurchaseStatus::Pending, PaymentMethod::CardTerminal);
        let without_charge = f.purchase(PurchaseStatus::Pending, PaymentMethod::CardTerminal);
        repo.create_with_check_ins(&with_charge, &[]).await.unwrap();
        repo.create_with_check_ins(&without_charge, &[]).await.unwrap();

        repo.set_charge_ref(with_charge.id, "chg-1", "term-A").await.unwrap();
        repo.set_transaction_ref(with_charge.id, "txn-9").await.unwrap();

        let by_ref = repo.get_by_charge_ref("chg-1").await.unwrap().unwrap();
        assert_eq!(by_ref.id, with_charge.id);
        assert_eq!(by_ref.terminal_id.as_deref(), Some("term-A"));
        assert_eq!(by_ref.gateway_transaction_ref.as_deref(), Some("txn-9"));

        let pending = repo.list_pending_with_charge_ref().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, with_charge.id);

        assert!(matches!(
            repo.set_charge_ref(Uuid::new_v4(), "chg-2", "term-A").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
