//! # Product Repository
//!
//! Database operations for products. Products are a read-only collaborator of
//! the purchase pipeline: the service re-fetches them on every cart to get the
//! authoritative net price and VAT rate.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use boxoffice_core::{Money, Product};

use super::{decode_money, decode_vat_rate};
use crate::error::{DbError, DbResult};

/// Raw `products` row.
#[derive(Debug, sqlx::FromRow)]
struct ProductRecord {
    id: Uuid,
    name: String,
    net_price: String,
    vat_rate_bps: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRecord> for Product {
    type Error = DbError;

    fn try_from(record: ProductRecord) -> DbResult<Self> {
        Ok(Product {
            id: record.id,
            name: record.name,
            net_price: decode_money("products.net_price", &record.net_price)?,
            vat_rate: decode_vat_rate("products.vat_rate_bps", record.vat_rate_bps)?,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let product = repo.get_by_id(id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets an active product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found or deactivated
    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Product>> {
        let record = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, name, net_price, vat_rate_bps, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Product::try_from).transpose()
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - ID already exists
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, net_price, vat_rate_bps, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.net_price.to_string())
        .bind(i64::from(product.vat_rate.bps()))
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts all products, active or not.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Updates a product's net price. Existing purchases keep their snapshot.
    pub async fn update_net_price(&self, id: Uuid, net_price: Money) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET net_price = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(net_price.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
