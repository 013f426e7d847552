//! # Inventory
//!
//! Barcode-keyed product map holding the register's live view of stock.
//!
//! ## Reservation Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   database stock  ─────────────────────────────► 30                    │
//! │                                                                         │
//! │   add 1001 x2     reserve ──► in-memory stock    28   (db still 30)    │
//! │   remove line     release ──► in-memory stock    30                    │
//! │   add 1001 x3     reserve ──► in-memory stock    27                    │
//! │   complete        db debit x3 in the sale txn ─► 27 = in-memory        │
//! │                                                                         │
//! │   Invariant: in-memory = database − quantities held by the open cart   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation either succeeds completely or leaves the map untouched.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Product, TaxRate};
use crate::validation::{validate_quantity, validate_restock_quantity};

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    products: BTreeMap<String, Product>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn from_products(products: impl IntoIterator<Item = Product>) -> Self {
        Inventory {
            products: products
                .into_iter()
                .map(|p| (p.barcode.clone(), p))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// All products, ordered by barcode.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn find_by_barcode(&self, barcode: &str) -> Option<&Product> {
        self.products.get(barcode.trim())
    }

    fn require(&self, barcode: &str) -> CoreResult<&Product> {
        self.find_by_barcode(barcode)
            .ok_or_else(|| CoreError::ProductNotFound(barcode.trim().to_string()))
    }

    /// Exact barcode match first, otherwise the first product (by barcode
    /// order) whose name contains `query`, case-insensitively.
    pub fn find_by_query(&self, query: &str) -> Option<&Product> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        if let Some(p) = self.find_by_barcode(query) {
            return Some(p);
        }
        let needle = query.to_lowercase();
        self.products
            .values()
            .find(|p| p.name.to_lowercase().contains(&needle))
    }

    /// Every product whose barcode or name contains `query`.
    pub fn search(&self, query: &str) -> Vec<&Product> {
        let needle = query.trim().to_lowercase();
        self.products
            .values()
            .filter(|p| {
                needle.is_empty()
                    || p.barcode.to_lowercase().contains(&needle)
                    || p.name.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Takes `qty` units out of available stock.
    ///
    /// Rejects unknown barcodes, non-positive quantities and anything that
    /// would drive stock below zero.
    pub fn reserve(&mut self, barcode: &str, qty: i64) -> CoreResult<()> {
        validate_quantity(qty)?;
        let available = self.require(barcode)?.stock;
        if available < qty {
            return Err(CoreError::InsufficientStock {
                barcode: barcode.trim().to_string(),
                available,
                requested: qty,
            });
        }
        self.adjust(barcode, -qty);
        Ok(())
    }

    /// Returns `qty` units to available stock.
    pub fn release(&mut self, barcode: &str, qty: i64) -> CoreResult<()> {
        if qty <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        self.require(barcode)?;
        self.adjust(barcode, qty);
        Ok(())
    }

    /// Adds delivered units. Returns the new stock level.
    pub fn restock(&mut self, barcode: &str, qty: i64) -> CoreResult<i64> {
        validate_restock_quantity(qty)?;
        self.require(barcode)?;
        Ok(self.adjust(barcode, qty))
    }

    /// Inserts a product, or updates the non-stock details of an existing one.
    ///
    /// Stock of an existing product is never overwritten here.
    pub fn upsert_details(
        &mut self,
        barcode: &str,
        name: &str,
        price: Money,
        low_stock_threshold: i64,
        tax_rate: TaxRate,
    ) -> &Product {
        let product = self
            .products
            .entry(barcode.trim().to_string())
            .or_insert_with(|| {
                Product::new(barcode.trim(), name, price, 0, low_stock_threshold, tax_rate)
            });
        product.name = name.trim().to_string();
        product.price_cents = price.cents();
        product.low_stock_threshold = low_stock_threshold;
        product.tax_rate_bps = tax_rate.bps();
        product.updated_at = Utc::now();
        product
    }

    /// Replaces a product wholesale, e.g. after re-reading it from storage.
    pub fn put(&mut self, product: Product) {
        self.products.insert(product.barcode.clone(), product);
    }

    /// Products at or below their threshold, by barcode.
    pub fn low_stock(&self) -> Vec<&Product> {
        self.products.values().filter(|p| p.is_low_stock()).collect()
    }

    fn adjust(&mut self, barcode: &str, delta: i64) -> i64 {
        match self.products.get_mut(barcode.trim()) {
            Some(p) => {
                p.stock += delta;
                p.updated_at = Utc::now();
                p.stock
            }
            None => 0,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Inventory {
        Inventory::from_products(vec![
            Product::new("1001", "Milk 1L", Money::from_cents(25_000), 30, 5, TaxRate::from_bps(1000)),
            Product::new("1002", "Bread Loaf", Money::from_cents(12_000), 50, 10, TaxRate::from_bps(500)),
            Product::new("1012", "Soap Bar", Money::from_cents(12_000), 3, 30, TaxRate::from_bps(500)),
        ])
    }

    #[test]
    fn test_reserve_and_release() {
        let mut inv = sample();
        inv.reserve("1001", 4).unwrap();
        assert_eq!(inv.find_by_barcode("1001").unwrap().stock, 26);

        inv.release("1001", 4).unwrap();
        assert_eq!(inv.find_by_barcode("1001").unwrap().stock, 30);
    }

    #[test]
    fn test_reserve_rejects_without_change() {
        let mut inv = sample();

        let err = inv.reserve("1012", 5).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 3, requested: 5, .. }
        ));
        assert_eq!(inv.find_by_barcode("1012").unwrap().stock, 3);

        assert!(inv.reserve("1001", 0).is_err());
        assert!(inv.reserve("1001", -2).is_err());
        assert!(matches!(inv.reserve("9999", 1), Err(CoreError::ProductNotFound(_))));
        assert_eq!(inv.find_by_barcode("1001").unwrap().stock, 30);
    }

    #[test]
    fn test_reserve_exact_stock_reaches_zero() {
        let mut inv = sample();
        inv.reserve("1012", 3).unwrap();
        assert_eq!(inv.find_by_barcode("1012").unwrap().stock, 0);
        assert!(inv.reserve("1012", 1).is_err());
    }

    #[test]
    fn test_release_rejects_bad_input() {
        let mut inv = sample();
        assert!(inv.release("9999", 1).is_err());
        assert!(inv.release("1001", 0).is_err());
    }

    #[test]
    fn test_find_by_query() {
        let inv = sample();
        assert_eq!(inv.find_by_query("1002").unwrap().name, "Bread Loaf");
        assert_eq!(inv.find_by_query("soap").unwrap().barcode, "1012");
        assert!(inv.find_by_query("caviar").is_none());
        assert!(inv.find_by_query("  ").is_none());
    }

    #[test]
    fn test_search() {
        let inv = sample();
        assert_eq!(inv.search("10").len(), 3);
        assert_eq!(inv.search("LOAF").len(), 1);
    }

    #[test]
    fn test_restock_and_low_stock() {
        let mut inv = sample();
        let low: Vec<&str> = inv.low_stock().iter().map(|p| p.barcode.as_str()).collect();
        assert_eq!(low, vec!["1012"]);

        assert_eq!(inv.restock("1012", 40).unwrap(), 43);
        assert!(inv.low_stock().is_empty());
        assert!(inv.restock("1012", 0).is_err());
    }

    #[test]
    fn test_upsert_details_keeps_stock() {
        let mut inv = sample();
        inv.upsert_details("1001", "Milk 1L Fresh", Money::from_cents(26_000), 8, TaxRate::from_bps(1000));
        let p = inv.find_by_barcode("1001").unwrap();
        assert_eq!(p.name, "Milk 1L Fresh");
        assert_eq!(p.price_cents, 26_000);
        assert_eq!(p.stock, 30);

        let created = inv.upsert_details("2001", "Honey", Money::from_cents(70_000), 2, TaxRate::zero());
        assert_eq!(created.stock, 0);
        assert_eq!(inv.len(), 4);
    }
}
