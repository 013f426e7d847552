//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Barcode lookup and name/barcode search
//! - Upsert of product details
//! - Stock delta updates
//!
//! ## Stock Delta Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                            │
//! │                                                                     │
//! │  ❌ Absolute update (loses concurrent changes)                      │
//! │     UPDATE products SET stock = 7 WHERE barcode = ?                 │
//! │                                                                     │
//! │  ✅ Guarded delta update                                            │
//! │     UPDATE products SET stock = stock - 3                           │
//! │      WHERE barcode = ? AND stock - 3 >= 0                           │
//! │                                                                     │
//! │  A sale of 3 and a restock of 10 commute: -3 + 10 = +7              │
//! │  The guard keeps stock from ever going negative.                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use till_core::Product;

const PRODUCT_COLUMNS: &str = "barcode, name, price_cents, stock, low_stock_threshold, \
                               tax_rate_bps, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// All products, ordered by barcode.
    ///
    /// The register loads this once at startup into its in-memory inventory.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY barcode");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Loaded products");
        Ok(products)
    }

    /// Gets a product by barcode.
    pub async fn get(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Products whose barcode or name contains `query` (case-insensitive).
    ///
    /// An empty query lists products by barcode.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        let pattern = format!("%{}%", escape_like(query));
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE barcode LIKE ?1 ESCAPE '\\' OR name LIKE ?1 ESCAPE '\\' \
             ORDER BY barcode LIMIT ?2"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Inserts a product, or updates name, price, threshold and tax rate of
    /// an existing one.
    ///
    /// Stock of an existing row is left alone; it only moves through
    /// [`update_stock`](Self::update_stock). A new row starts at
    /// `product.stock`.
    pub async fn upsert(&self, product: &Product) -> DbResult<Product> {
        debug!(barcode = %product.barcode, "Upserting product");

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO products (
                barcode, name, price_cents, stock, low_stock_threshold,
                tax_rate_bps, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT (barcode) DO UPDATE SET
                name = excluded.name,
                price_cents = excluded.price_cents,
                low_stock_threshold = excluded.low_stock_threshold,
                tax_rate_bps = excluded.tax_rate_bps,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(product.tax_rate_bps)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&product.barcode)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &product.barcode))
    }

    /// Applies a stock delta. Returns the new stock level.
    ///
    /// ## Arguments
    /// * `barcode` - Product barcode
    /// * `delta` - Change in stock (negative for sales, positive for restock and refunds)
    ///
    /// ## Errors
    /// * `NotFound` - no such barcode
    /// * `StockUnderflow` - the delta would leave stock below zero
    pub async fn update_stock(&self, barcode: &str, delta: i64) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        apply_stock_delta(&mut conn, barcode, delta, Utc::now()).await
    }

    /// Products with stock at or below their threshold, ordered by barcode.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE stock <= low_stock_threshold ORDER BY barcode"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Guarded stock delta on any connection, including one inside a transaction.
///
/// Sales and refunds call this from their own transaction so the stock
/// change commits or rolls back with the rest of the write.
pub(crate) async fn apply_stock_delta(
    conn: &mut SqliteConnection,
    barcode: &str,
    delta: i64,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    debug!(barcode = %barcode, delta = %delta, "Updating stock");

    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET stock = stock + ?2, updated_at = ?3
        WHERE barcode = ?1 AND stock + ?2 >= 0
        RETURNING stock
        "#,
    )
    .bind(barcode)
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = updated {
        return Ok(stock);
    }

    let available: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE barcode = ?1")
        .bind(barcode)
        .fetch_optional(&mut *conn)
        .await?;

    match available {
        Some(available) => Err(DbError::StockUnderflow {
            barcode: barcode.to_string(),
            delta,
            available,
        }),
        None => Err(DbError::not_found("Product", barcode)),
    }
}

/// Escapes `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use till_core::{Money, TaxRate};

    async fn db_with_products() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        for p in [
            Product::new("1001", "Milk 1L", Money::from_cents(25_000), 30, 5, TaxRate::from_bps(1000)),
            Product::new("1002", "Bread Loaf", Money::from_cents(12_000), 50, 10, TaxRate::from_bps(500)),
            Product::new("1012", "Soap Bar", Money::from_cents(12_000), 3, 30, TaxRate::from_bps(500)),
        ] {
            repo.upsert(&p).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = db_with_products().await;
        let milk = db.products().get("1001").await.unwrap().unwrap();
        assert_eq!(milk.name, "Milk 1L");
        assert_eq!(milk.tax_rate_bps, 1000);
        assert!(db.products().get("9999").await.unwrap().is_none());
        assert_eq!(db.products().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_does_not_touch_stock() {
        let db = db_with_products().await;
        let changed = Product::new("1001", "Milk 1L Fresh", Money::from_cents(26_000), 999, 8, TaxRate::from_bps(1000));

        let stored = db.products().upsert(&changed).await.unwrap();
        assert_eq!(stored.name, "Milk 1L Fresh");
        assert_eq!(stored.price_cents, 26_000);
        assert_eq!(stored.low_stock_threshold, 8);
        assert_eq!(stored.stock, 30);
    }

    #[tokio::test]
    async fn test_update_stock_delta() {
        let db = db_with_products().await;
        let repo = db.products();

        assert_eq!(repo.update_stock("1001", -4).await.unwrap(), 26);
        assert_eq!(repo.update_stock("1001", 10).await.unwrap(), 36);

        assert!(matches!(
            repo.update_stock("1012", -4).await,
            Err(DbError::StockUnderflow { available: 3, .. })
        ));
        assert_eq!(repo.get("1012").await.unwrap().unwrap().stock, 3);

        assert!(matches!(
            repo.update_stock("nope", 1).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_and_low_stock() {
        let db = db_with_products().await;
        let repo = db.products();

        assert_eq!(repo.search("loaf", 10).await.unwrap().len(), 1);
        assert_eq!(repo.search("100", 10).await.unwrap().len(), 2);
        assert_eq!(repo.search("", 2).await.unwrap().len(), 2);
        assert!(repo.search("50%", 10).await.unwrap().is_empty());

        let low = repo.low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].barcode, "1012");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
