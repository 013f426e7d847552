//! # Sale Repository
//!
//! Completed sales, their lines and payments, and refunds against them.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CART (register memory only)                                         │
//! │     └── Checkout::add_item() reserves in-memory stock                   │
//! │                                                                         │
//! │  2. COMPLETE                                                            │
//! │     └── record_completed_sale()  ── one transaction ──                  │
//! │         ├── INSERT sales, sale_lines, sale_payments                     │
//! │         ├── products.stock -= qty   (guarded delta, per line)           │
//! │         └── customers.loyalty_points -= redeemed, += earned             │
//! │                                                                         │
//! │  3. (OPTIONAL) REFUND                                                   │
//! │     └── apply_refund()           ── one transaction ──                  │
//! │         ├── UPDATE sales ... WHERE refunded = 0                         │
//! │         ├── UPDATE sale_lines (refunded flag, repriced survivors)       │
//! │         ├── products.stock += qty                                       │
//! │         └── INSERT refund_log                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure inside a transaction rolls the whole write back; the
//! transaction is dropped without commit.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::product::apply_stock_delta;
use crate::error::{DbError, DbResult};
use till_core::{
    CompletedSale, RefundLogEntry, RefundPlan, Sale, SaleLine, SalePayment, SaleRecord, User,
};

const SALE_COLUMNS: &str = "id, cashier, customer_id, customer_phone, promo_code, \
                            subtotal_cents, discount_cents, tax_cents, total_cents, \
                            paid_cents, change_cents, points_earned, refunded, \
                            created_at, updated_at";

const LINE_COLUMNS: &str = "sale_id, line_no, barcode, name, unit_price_cents, tax_rate_bps, \
                            quantity, discount_cents, tax_cents, refunded";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Persists a completed sale and its side effects atomically.
    ///
    /// ## Errors
    /// * `StockUnderflow` - a line wants more than the database has on hand
    /// * `NotFound` - a line names an unknown barcode
    /// * `UniqueViolation` - the sale id was already recorded
    pub async fn record_completed_sale(&self, sale: &CompletedSale) -> DbResult<()> {
        let record = &sale.record;
        debug!(id = %record.id, lines = sale.lines.len(), "Recording sale");

        let mut tx = self.pool.begin().await?;

        insert_record(&mut tx, record).await?;
        for line in &sale.lines {
            insert_line(&mut tx, line).await?;
        }
        for payment in &sale.payments {
            sqlx::query(
                "INSERT INTO sale_payments (sale_id, seq, method, amount_cents) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&payment.sale_id)
            .bind(payment.seq)
            .bind(payment.method)
            .bind(payment.amount_cents)
            .execute(&mut *tx)
            .await?;
        }

        for line in &sale.lines {
            apply_stock_delta(&mut tx, &line.barcode, -line.quantity, record.created_at).await?;
        }

        if let Some(customer_id) = &record.customer_id {
            let result = sqlx::query(
                r#"
                UPDATE customers
                SET loyalty_points = MAX(loyalty_points - ?2, 0) + ?3, updated_at = ?4
                WHERE id = ?1
                "#,
            )
            .bind(customer_id)
            .bind(sale.points_redeemed.hundredths())
            .bind(sale.points_earned.hundredths())
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Customer", customer_id));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            id = %record.id,
            total_cents = record.total_cents,
            points_earned = sale.points_earned.hundredths(),
            "Sale recorded"
        );
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Gets a sale header by ID.
    pub async fn get_record(&self, id: &str) -> DbResult<Option<SaleRecord>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let record = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Gets a sale with its lines and payments.
    pub async fn get_sale(&self, id: &str) -> DbResult<Option<Sale>> {
        let Some(record) = self.get_record(id).await? else {
            return Ok(None);
        };

        let sql = format!("SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY line_no");
        let lines = sqlx::query_as::<_, SaleLine>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let payments = sqlx::query_as::<_, SalePayment>(
            "SELECT sale_id, seq, method, amount_cents FROM sale_payments WHERE sale_id = ?1 ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Sale {
            record,
            lines,
            payments,
        }))
    }

    /// Most recent sale headers first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<SaleRecord>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales ORDER BY created_at DESC, id LIMIT ?1");
        let records = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Applies a refund plan atomically and logs it.
    ///
    /// The sale update is guarded on `refunded = 0` and every line update on
    /// the refunded flag the plan was built from, so a plan built from a
    /// stale read fails with `Conflict`. It never credits stock twice or
    /// clears a flag a newer refund set.
    pub async fn apply_refund(&self, plan: &RefundPlan, user: &User) -> DbResult<RefundLogEntry> {
        let record = &plan.record;
        debug!(id = %record.id, kind = %plan.kind, "Applying refund");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                subtotal_cents = ?2, discount_cents = ?3, tax_cents = ?4, total_cents = ?5,
                refunded = ?6, updated_at = ?7
            WHERE id = ?1 AND refunded = 0
            "#,
        )
        .bind(&record.id)
        .bind(record.subtotal_cents)
        .bind(record.discount_cents)
        .bind(record.tax_cents)
        .bind(record.total_cents)
        .bind(record.refunded)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("sale {} is already refunded", record.id)));
        }

        for line in &plan.lines {
            let newly_refunded = plan.refunded_line_nos.contains(&line.line_no);
            let was_refunded = line.refunded && !newly_refunded;
            let result = sqlx::query(
                r#"
                UPDATE sale_lines SET refunded = ?3, discount_cents = ?4, tax_cents = ?5
                WHERE sale_id = ?1 AND line_no = ?2 AND refunded = ?6
                "#,
            )
            .bind(&line.sale_id)
            .bind(line.line_no)
            .bind(line.refunded)
            .bind(line.discount_cents)
            .bind(line.tax_cents)
            .bind(was_refunded)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::Conflict(format!(
                    "line {} of sale {} changed since the refund was planned",
                    line.line_no, record.id
                )));
            }
        }

        for (barcode, qty) in &plan.restock {
            apply_stock_delta(&mut tx, barcode, *qty, record.updated_at).await?;
        }

        let entry = RefundLogEntry {
            id: Uuid::new_v4().to_string(),
            sale_id: record.id.clone(),
            kind: plan.kind,
            processed_by: user.username.clone(),
            role: user.role,
            amount_cents: plan.amount.cents(),
            items: plan.items.clone(),
            created_at: record.updated_at,
        };
        insert_refund_log(&mut tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            id = %record.id,
            kind = %plan.kind,
            amount_cents = entry.amount_cents,
            "Refund applied"
        );
        Ok(entry)
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

async fn insert_record(conn: &mut SqliteConnection, record: &SaleRecord) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, cashier, customer_id, customer_phone, promo_code,
            subtotal_cents, discount_cents, tax_cents, total_cents,
            paid_cents, change_cents, points_earned, refunded,
            created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15
        )
        "#,
    )
    .bind(&record.id)
    .bind(&record.cashier)
    .bind(&record.customer_id)
    .bind(&record.customer_phone)
    .bind(&record.promo_code)
    .bind(record.subtotal_cents)
    .bind(record.discount_cents)
    .bind(record.tax_cents)
    .bind(record.total_cents)
    .bind(record.paid_cents)
    .bind(record.change_cents)
    .bind(record.points_earned)
    .bind(record.refunded)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &record.id),
        other => other,
    })?;

    Ok(())
}

async fn insert_line(conn: &mut SqliteConnection, line: &SaleLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_lines (
            sale_id, line_no, barcode, name, unit_price_cents, tax_rate_bps,
            quantity, discount_cents, tax_cents, refunded
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&line.sale_id)
    .bind(line.line_no)
    .bind(&line.barcode)
    .bind(&line.name)
    .bind(line.unit_price_cents)
    .bind(line.tax_rate_bps)
    .bind(line.quantity)
    .bind(line.discount_cents)
    .bind(line.tax_cents)
    .bind(line.refunded)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        // sale_lines.barcode references products
        DbError::ForeignKeyViolation { .. } => DbError::not_found("Product", &line.barcode),
        other => other,
    })?;

    Ok(())
}

async fn insert_refund_log(conn: &mut SqliteConnection, entry: &RefundLogEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO refund_log (id, sale_id, kind, processed_by, role, amount_cents, items, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.sale_id)
    .bind(entry.kind)
    .bind(&entry.processed_by)
    .bind(entry.role)
    .bind(entry.amount_cents)
    .bind(&entry.items)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use till_core::refund::{plan_full, plan_partial};
    use till_core::{
        Checkout, Inventory, LoyaltyPoints, Money, Payment, PaymentMethod, Product,
        PromotionCatalog, RefundKind, Role, TaxRate,
    };

    fn products() -> Vec<Product> {
        vec![
            Product::new("1001", "Milk 1L", Money::from_cents(10_000), 10, 2, TaxRate::from_bps(1000)),
            Product::new("1012", "Soap Bar", Money::from_cents(12_000), 5, 1, TaxRate::from_bps(500)),
        ]
    }

    async fn setup() -> (Database, Inventory) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for p in products() {
            db.products().upsert(&p).await.unwrap();
        }
        (db, Inventory::from_products(products()))
    }

    fn manager() -> User {
        User::new("manager", "2222", Role::Manager)
    }

    #[tokio::test]
    async fn test_record_sale_debits_stock_and_credits_points() {
        let (db, mut inventory) = setup().await;
        let customer = db.customers().attach_or_create("0300").await.unwrap();

        let mut checkout = Checkout::start("cashier1");
        checkout.add_item(&mut inventory, "1001", 1).unwrap();
        checkout.apply_promo(&PromotionCatalog::builtin(), "PCT5").unwrap();
        checkout.attach_customer(customer);
        checkout
            .add_payment(Payment::new(PaymentMethod::Cash, Money::from_cents(20_000)))
            .unwrap();

        let completed = checkout.complete(Utc::now()).unwrap();
        assert_eq!(completed.record.total_cents, 10_450);
        db.sales().record_completed_sale(&completed).await.unwrap();

        let stored = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        assert_eq!(stored.record.discount_cents, 500);
        assert_eq!(stored.record.tax_cents, 950);
        assert_eq!(stored.record.change_cents, 9_550);
        assert_eq!(stored.lines.len(), 1);
        assert_eq!(stored.payments[0].method, PaymentMethod::Cash);

        assert_eq!(db.products().get("1001").await.unwrap().unwrap().stock, 9);
        let customer = db.customers().get_by_phone("0300").await.unwrap().unwrap();
        assert_eq!(customer.points(), LoyaltyPoints::earned_on(Money::from_cents(10_450)));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let (db, mut inventory) = setup().await;

        let mut checkout = Checkout::start("cashier1");
        checkout.add_item(&mut inventory, "1001", 2).unwrap();
        checkout.add_item(&mut inventory, "1012", 3).unwrap();
        checkout
            .add_payment(Payment::new(PaymentMethod::Card, Money::from_cents(100_000)))
            .unwrap();
        let completed = checkout.complete(Utc::now()).unwrap();

        // Someone else sold soap since the register loaded its inventory
        db.products().update_stock("1012", -4).await.unwrap();

        let err = db.sales().record_completed_sale(&completed).await.unwrap_err();
        assert!(matches!(err, DbError::StockUnderflow { .. }));

        assert!(db.sales().get_sale(checkout.id()).await.unwrap().is_none());
        assert_eq!(db.products().get("1001").await.unwrap().unwrap().stock, 10);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_refund_once() {
        let (db, mut inventory) = setup().await;

        let mut checkout = Checkout::start("cashier1");
        checkout.add_item(&mut inventory, "1001", 2).unwrap();
        checkout
            .add_payment(Payment::new(PaymentMethod::Cash, Money::from_cents(22_000)))
            .unwrap();
        let completed = checkout.complete(Utc::now()).unwrap();
        db.sales().record_completed_sale(&completed).await.unwrap();
        assert_eq!(db.products().get("1001").await.unwrap().unwrap().stock, 8);

        let sale = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        let plan = plan_full(&sale, Utc::now()).unwrap();
        let entry = db.sales().apply_refund(&plan, &manager()).await.unwrap();
        assert_eq!(entry.kind, RefundKind::Full);
        assert_eq!(entry.amount_cents, 22_000);
        assert_eq!(entry.items, "Milk 1L x2");
        assert_eq!(db.products().get("1001").await.unwrap().unwrap().stock, 10);

        // Replaying the stale plan must not credit stock again
        let err = db.sales().apply_refund(&plan, &manager()).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(db.products().get("1001").await.unwrap().unwrap().stock, 10);

        let sale = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        assert!(sale.record.refunded);
        assert!(plan_full(&sale, Utc::now()).is_err());
        assert_eq!(db.refund_log().for_sale(checkout.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_refund_reprices_remaining_lines() {
        let (db, mut inventory) = setup().await;
        let catalog = PromotionCatalog::builtin();

        let mut checkout = Checkout::start("cashier1");
        checkout.add_item(&mut inventory, "1001", 1).unwrap();
        checkout.add_item(&mut inventory, "1012", 1).unwrap();
        checkout.apply_promo(&catalog, "FIX10").unwrap();
        checkout
            .add_payment(Payment::new(PaymentMethod::Cash, Money::from_cents(50_000)))
            .unwrap();
        let completed = checkout.complete(Utc::now()).unwrap();
        let grand_before = completed.record.total_cents;
        db.sales().record_completed_sale(&completed).await.unwrap();

        let sale = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        let plan = plan_partial(&sale, &[2, 7], &catalog, Utc::now()).unwrap();
        let entry = db.sales().apply_refund(&plan, &manager()).await.unwrap();
        assert_eq!(entry.kind, RefundKind::Partial);
        assert_eq!(entry.items, "Soap Bar x1");

        let after = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        assert!(!after.record.refunded);
        assert!(after.lines[1].refunded);
        assert!(!after.lines[0].refunded);
        // 100.00 - 10.00 FIX10 + 10% tax on 90.00
        assert_eq!(after.record.total_cents, 9_900);
        assert_eq!(entry.amount_cents, grand_before - 9_900);
        assert_eq!(db.products().get("1012").await.unwrap().unwrap().stock, 5);

        // Refunding the last line closes the sale
        let plan = plan_partial(&after, &[1], &catalog, Utc::now()).unwrap();
        db.sales().apply_refund(&plan, &manager()).await.unwrap();
        let closed = db.sales().get_record(checkout.id()).await.unwrap().unwrap();
        assert!(closed.refunded);
        assert_eq!(closed.total_cents, 0);
    }

    #[tokio::test]
    async fn test_stale_partial_plan_keeps_newer_refund() {
        let (db, mut inventory) = setup().await;
        let catalog = PromotionCatalog::builtin();

        let mut checkout = Checkout::start("cashier1");
        checkout.add_item(&mut inventory, "1001", 1).unwrap();
        checkout.add_item(&mut inventory, "1012", 1).unwrap();
        checkout
            .add_payment(Payment::new(PaymentMethod::Cash, Money::from_cents(50_000)))
            .unwrap();
        let completed = checkout.complete(Utc::now()).unwrap();
        db.sales().record_completed_sale(&completed).await.unwrap();

        // Two terminals read the sale before either refunds
        let sale = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        let first = plan_partial(&sale, &[2], &catalog, Utc::now()).unwrap();
        let stale = plan_partial(&sale, &[1], &catalog, Utc::now()).unwrap();

        db.sales().apply_refund(&first, &manager()).await.unwrap();
        let soap_stock = db.products().get("1012").await.unwrap().unwrap().stock;
        let milk_stock = db.products().get("1001").await.unwrap().unwrap().stock;

        let err = db.sales().apply_refund(&stale, &manager()).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        let after = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
        assert!(after.lines.iter().any(|l| l.line_no == 2 && l.refunded));
        assert!(after.lines.iter().all(|l| l.line_no == 2 || !l.refunded));
        assert_eq!(db.products().get("1012").await.unwrap().unwrap().stock, soap_stock);
        assert_eq!(db.products().get("1001").await.unwrap().unwrap().stock, milk_stock);
        assert_eq!(db.refund_log().for_sale(checkout.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_recent() {
        let (db, mut inventory) = setup().await;
        for _ in 0..3 {
            let mut checkout = Checkout::start("cashier1");
            checkout.add_item(&mut inventory, "1012", 1).unwrap();
            checkout
                .add_payment(Payment::new(PaymentMethod::Cash, Money::from_cents(20_000)))
                .unwrap();
            let completed = checkout.complete(Utc::now()).unwrap();
            db.sales().record_completed_sale(&completed).await.unwrap();
        }

        assert_eq!(db.sales().list_recent(2).await.unwrap().len(), 2);
        assert_eq!(db.sales().list_recent(10).await.unwrap().len(), 3);
    }
}
