//! # Refund Log Repository
//!
//! Read side of the refund history. Rows are written by
//! [`SaleRepository::apply_refund`](super::sale::SaleRepository::apply_refund)
//! inside the refund transaction and never updated.

use sqlx::SqlitePool;

use crate::error::DbResult;
use till_core::RefundLogEntry;

const LOG_COLUMNS: &str = "id, sale_id, kind, processed_by, role, amount_cents, items, created_at";

/// Repository for refund log queries.
#[derive(Debug, Clone)]
pub struct RefundLogRepository {
    pool: SqlitePool,
}

impl RefundLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RefundLogRepository { pool }
    }

    /// Newest entries first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<RefundLogEntry>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM refund_log ORDER BY created_at DESC, id LIMIT ?1");
        let entries = sqlx::query_as::<_, RefundLogEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Every refund recorded against one sale, oldest first.
    pub async fn for_sale(&self, sale_id: &str) -> DbResult<Vec<RefundLogEntry>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM refund_log WHERE sale_id = ?1 ORDER BY created_at, id");
        let entries = sqlx::query_as::<_, RefundLogEntry>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use till_core::refund::plan_partial;
    use till_core::{
        Checkout, Inventory, Money, Payment, PaymentMethod, Product, PromotionCatalog, RefundKind,
        Role, TaxRate, User,
    };

    #[tokio::test]
    async fn test_entries_per_refund() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = vec![
            Product::new("1002", "Bread Loaf", Money::from_cents(12_000), 50, 10, TaxRate::from_bps(500)),
            Product::new("1016", "Biscuits Pack", Money::from_cents(9_000), 150, 20, TaxRate::from_bps(500)),
        ];
        for p in &products {
            db.products().upsert(p).await.unwrap();
        }
        let mut inventory = Inventory::from_products(products);

        let mut checkout = Checkout::start("cashier1");
        checkout.add_item(&mut inventory, "1002", 1).unwrap();
        checkout.add_item(&mut inventory, "1016", 2).unwrap();
        checkout
            .add_payment(Payment::new(PaymentMethod::Card, Money::from_cents(40_000)))
            .unwrap();
        let completed = checkout.complete(Utc::now()).unwrap();
        db.sales().record_completed_sale(&completed).await.unwrap();

        let admin = User::new("admin", "1234", Role::Admin);
        let catalog = PromotionCatalog::builtin();
        for line in [1, 2] {
            let sale = db.sales().get_sale(checkout.id()).await.unwrap().unwrap();
            let plan = plan_partial(&sale, &[line], &catalog, Utc::now()).unwrap();
            db.sales().apply_refund(&plan, &admin).await.unwrap();
        }

        let log = db.refund_log().for_sale(checkout.id()).await.unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|e| e.kind == RefundKind::Partial));
        assert!(log.iter().all(|e| e.role == Role::Admin && e.processed_by == "admin"));
        assert_eq!(log[0].items, "Bread Loaf x1");
        assert_eq!(log[1].items, "Biscuits Pack x2");

        assert_eq!(db.refund_log().list_recent(1).await.unwrap().len(), 1);
        assert!(db.refund_log().for_sale("nope").await.unwrap().is_empty());
    }
}
