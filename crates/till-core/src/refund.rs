//! # Refund Planning
//!
//! Works out what a refund changes without touching any store. The
//! database applies a [`RefundPlan`] in one transaction; the register then
//! releases the same quantities into its in-memory inventory.
//!
//! ## Full vs Partial
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  FULL                                                                    │
//! │    every active line ──► refunded, stock credited                        │
//! │    sale.refunded = true                                                  │
//! │    amount = current grand total                                          │
//! │                                                                          │
//! │  PARTIAL (line numbers)                                                  │
//! │    unknown / already refunded numbers ──► ignored                        │
//! │    selected lines ──► refunded, stock credited                           │
//! │    remaining lines ──► repriced with the sale's promo + snapshots        │
//! │    sale.refunded = no active lines left                                  │
//! │    amount = old grand − new grand                                        │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sale already flagged as refunded yields `AlreadyRefunded`, so running
//! the same refund twice never credits stock twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::checkout::price_lines;
use crate::error::{CoreError, CoreResult};
use crate::inventory::Inventory;
use crate::money::Money;
use crate::promotion::PromotionCatalog;
use crate::types::{Sale, SaleLine, SaleRecord, TaxRate};

// =============================================================================
// Refund Kind
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefundKind {
    Full,
    Partial,
}

impl fmt::Display for RefundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefundKind::Full => "FULL",
            RefundKind::Partial => "PARTIAL",
        })
    }
}

// =============================================================================
// Refund Plan
// =============================================================================

/// The full effect of one refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    pub kind: RefundKind,
    /// Sale header after the refund.
    pub record: SaleRecord,
    /// Every line of the sale after the refund, including repriced
    /// survivors of a partial refund.
    pub lines: Vec<SaleLine>,
    /// Line numbers refunded by this plan.
    pub refunded_line_nos: Vec<i64>,
    /// Units to credit back, per barcode.
    pub restock: Vec<(String, i64)>,
    pub amount: Money,
    /// e.g. `Milk 1L x2; Soap Bar x1`
    pub items: String,
}

impl RefundPlan {
    /// Credits the refunded units to the register's in-memory stock.
    ///
    /// Returns the barcodes that were not in memory. The database copy of
    /// those products is already credited.
    pub fn release_into(&self, inventory: &mut Inventory) -> Vec<String> {
        self.restock
            .iter()
            .filter(|(barcode, qty)| inventory.release(barcode, *qty).is_err())
            .map(|(barcode, _)| barcode.clone())
            .collect()
    }
}

/// Plans refunding every remaining line of `sale`.
pub fn plan_full(sale: &Sale, at: DateTime<Utc>) -> CoreResult<RefundPlan> {
    let id = sale.record.id.clone();
    if sale.record.refunded {
        return Err(CoreError::AlreadyRefunded(id));
    }

    let selected: BTreeSet<i64> = sale.active_lines().map(|l| l.line_no).collect();
    if selected.is_empty() {
        return Err(CoreError::AlreadyRefunded(id));
    }

    let lines: Vec<SaleLine> = sale
        .lines
        .iter()
        .cloned()
        .map(|mut l| {
            l.refunded = true;
            l
        })
        .collect();

    let mut record = sale.record.clone();
    record.refunded = true;
    record.updated_at = at;

    Ok(build_plan(RefundKind::Full, sale, &selected, record, lines, sale.record.total()))
}

/// Plans refunding the lines numbered in `line_nos`.
///
/// Unknown or already refunded numbers are ignored. If nothing is left to
/// refund the result is `NothingToRefund`.
pub fn plan_partial(
    sale: &Sale,
    line_nos: &[i64],
    catalog: &PromotionCatalog,
    at: DateTime<Utc>,
) -> CoreResult<RefundPlan> {
    let id = sale.record.id.clone();
    if sale.record.refunded {
        return Err(CoreError::AlreadyRefunded(id));
    }

    let requested: BTreeSet<i64> = line_nos.iter().copied().collect();
    let selected: BTreeSet<i64> = sale
        .active_lines()
        .map(|l| l.line_no)
        .filter(|n| requested.contains(n))
        .collect();
    if selected.is_empty() {
        return Err(CoreError::NothingToRefund(id));
    }

    let mut lines: Vec<SaleLine> = sale.lines.clone();
    for line in lines.iter_mut() {
        if selected.contains(&line.line_no) {
            line.refunded = true;
        }
    }

    // Reprice what is left under the original promo
    let remaining: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.refunded)
        .map(|(i, _)| i)
        .collect();
    let inputs: Vec<(Money, TaxRate)> = remaining
        .iter()
        .map(|&i| (lines[i].line_subtotal(), TaxRate::from_bps(lines[i].tax_rate_bps)))
        .collect();
    let promo = sale.record.promo_code.as_deref().and_then(|c| catalog.get(c));
    let (charges, totals) = price_lines(&inputs, promo);
    for (&i, charge) in remaining.iter().zip(charges) {
        lines[i].discount_cents = charge.discount.cents();
        lines[i].tax_cents = charge.tax.cents();
    }

    let mut record = sale.record.clone();
    record.subtotal_cents = totals.subtotal_cents;
    record.discount_cents = totals.discount_cents;
    record.tax_cents = totals.tax_cents;
    record.total_cents = totals.total_cents;
    record.refunded = remaining.is_empty();
    record.updated_at = at;

    // A promo dropped from the catalog since the sale can make the
    // repriced total higher; never refund a negative amount.
    let amount = (sale.record.total() - totals.total()).non_negative();

    Ok(build_plan(RefundKind::Partial, sale, &selected, record, lines, amount))
}

fn build_plan(
    kind: RefundKind,
    sale: &Sale,
    selected: &BTreeSet<i64>,
    record: SaleRecord,
    lines: Vec<SaleLine>,
    amount: Money,
) -> RefundPlan {
    let refunded: Vec<&SaleLine> = sale
        .lines
        .iter()
        .filter(|l| selected.contains(&l.line_no))
        .collect();

    let mut restock: Vec<(String, i64)> = Vec::new();
    for line in &refunded {
        match restock.iter_mut().find(|(b, _)| *b == line.barcode) {
            Some((_, qty)) => *qty += line.quantity,
            None => restock.push((line.barcode.clone(), line.quantity)),
        }
    }

    let items = refunded
        .iter()
        .map(|l| format!("{} x{}", l.name, l.quantity))
        .collect::<Vec<_>>()
        .join("; ");

    RefundPlan {
        kind,
        record,
        lines,
        refunded_line_nos: selected.iter().copied().collect(),
        restock,
        amount,
        items,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::Checkout;
    use crate::types::{Payment, PaymentMethod, Product};

    fn completed_sale(promo: Option<&str>) -> (Sale, Inventory) {
        let mut inv = Inventory::from_products(vec![
            Product::new("1001", "Milk 1L", Money::from_cents(25_000), 30, 5, TaxRate::from_bps(1000)),
            Product::new("1012", "Soap Bar", Money::from_cents(12_000), 200, 30, TaxRate::from_bps(500)),
            Product::new("1020", "Water Bottle 1.5L", Money::from_cents(6_000), 300, 50, TaxRate::zero()),
        ]);
        let catalog = PromotionCatalog::builtin();
        let mut co = Checkout::start("cashier1");
        co.add_item(&mut inv, "1001", 2).unwrap();
        co.add_item(&mut inv, "1012", 1).unwrap();
        co.add_item(&mut inv, "1020", 3).unwrap();
        if let Some(code) = promo {
            co.apply_promo(&catalog, code).unwrap();
        }
        co.add_payment(Payment::new(PaymentMethod::Cash, Money::from_cents(1_000_000))).unwrap();
        (co.complete(Utc::now()).unwrap().into_sale(), inv)
    }

    #[test]
    fn test_full_refund() {
        let (sale, mut inv) = completed_sale(None);
        let plan = plan_full(&sale, Utc::now()).unwrap();

        assert_eq!(plan.kind, RefundKind::Full);
        assert!(plan.record.refunded);
        assert!(plan.lines.iter().all(|l| l.refunded));
        assert_eq!(plan.amount, sale.record.total());
        assert_eq!(plan.items, "Milk 1L x2; Soap Bar x1; Water Bottle 1.5L x3");

        assert!(plan.release_into(&mut inv).is_empty());
        assert_eq!(inv.find_by_barcode("1001").unwrap().stock, 30);
        assert_eq!(inv.find_by_barcode("1020").unwrap().stock, 300);
    }

    #[test]
    fn test_second_refund_rejected() {
        let (mut sale, _) = completed_sale(None);
        let plan = plan_full(&sale, Utc::now()).unwrap();
        sale.record = plan.record;
        sale.lines = plan.lines;

        assert!(matches!(plan_full(&sale, Utc::now()), Err(CoreError::AlreadyRefunded(_))));
        assert!(matches!(
            plan_partial(&sale, &[1], &PromotionCatalog::builtin(), Utc::now()),
            Err(CoreError::AlreadyRefunded(_))
        ));
    }

    #[test]
    fn test_partial_refund_reprices_with_promo() {
        let (sale, _) = completed_sale(Some("PCT5"));
        let catalog = PromotionCatalog::builtin();

        let plan = plan_partial(&sale, &[1, 1, 42], &catalog, Utc::now()).unwrap();
        assert_eq!(plan.kind, RefundKind::Partial);
        assert_eq!(plan.refunded_line_nos, vec![1]);
        assert_eq!(plan.restock, vec![("1001".to_string(), 2)]);
        assert!(!plan.record.refunded);

        // Remaining: 120.00 @5% + 180.00 @0%, PCT5 on 300.00 = 15.00
        assert_eq!(plan.record.subtotal_cents, 30_000);
        assert_eq!(plan.record.discount_cents, 1_500);
        let active_tax: i64 = plan.lines.iter().filter(|l| !l.refunded).map(|l| l.tax_cents).sum();
        assert_eq!(active_tax, plan.record.tax_cents);
        assert_eq!(
            plan.record.total_cents,
            plan.record.subtotal_cents - plan.record.discount_cents + plan.record.tax_cents
        );
        assert_eq!(plan.amount.cents(), sale.record.total_cents - plan.record.total_cents);
    }

    #[test]
    fn test_partial_refund_of_last_lines_flips_flag() {
        let (mut sale, _) = completed_sale(None);
        let catalog = PromotionCatalog::builtin();

        let first = plan_partial(&sale, &[2], &catalog, Utc::now()).unwrap();
        sale.record = first.record;
        sale.lines = first.lines;

        // Line 2 is already refunded and ignored
        let second = plan_partial(&sale, &[1, 2, 3], &catalog, Utc::now()).unwrap();
        assert_eq!(second.refunded_line_nos, vec![1, 3]);
        assert!(second.record.refunded);
        assert_eq!(second.record.total_cents, 0);
    }

    #[test]
    fn test_partial_with_nothing_valid() {
        let (sale, _) = completed_sale(None);
        assert!(matches!(
            plan_partial(&sale, &[0, 99], &PromotionCatalog::builtin(), Utc::now()),
            Err(CoreError::NothingToRefund(_))
        ));
    }
}
