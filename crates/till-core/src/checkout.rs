//! # Checkout
//!
//! The open transaction at the register: cart lines, promo code, attached
//! customer, tendered payments and the totals derived from them.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Checkout::start(cashier)                                               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  add_item ──► Inventory::reserve ──► merge/push line ──► recalculate   │
//! │  remove_line ──► Inventory::release ──► drop line ──► recalculate      │
//! │  apply_promo / clear_promo / attach_customer ──► recalculate           │
//! │  add_payment                                                            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  complete(at) ──► CompletedSale  (header + lines + payments + points)  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  till-db: record_completed_sale  (one SQL transaction)                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Totals
//! Recomputed from scratch after every mutation:
//!
//! - `subtotal = Σ unit_price × qty`
//! - `discount = promo(subtotal)`, split across lines by line subtotal
//! - `line tax = rate × (line subtotal − line discount)`, half-up
//! - `grand = subtotal − discount + tax`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::inventory::Inventory;
use crate::money::{LoyaltyPoints, Money};
use crate::promotion::{PromoRule, PromotionCatalog};
use crate::types::{
    Customer, Payment, PaymentMethod, Sale, SaleLine, SalePayment, SaleRecord, TaxRate,
};
use crate::validation::{validate_cart_size, validate_payment_amount, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, PAYMENT_EPSILON_CENTS};

// =============================================================================
// Cart Item
// =============================================================================

/// A cart line: product snapshot plus quantity and computed charges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub barcode: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
    pub quantity: i64,
    /// Share of the promo discount allocated to this line.
    pub discount_cents: i64,
    pub tax_cents: i64,
}

impl CartItem {
    pub fn line_subtotal(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    pub fn line_total(&self) -> Money {
        self.line_subtotal() - Money::from_cents(self.discount_cents)
            + Money::from_cents(self.tax_cents)
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

// =============================================================================
// Totals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl Totals {
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Discount and tax computed for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCharge {
    pub discount: Money,
    pub tax: Money,
}

/// Prices a set of lines given as `(line subtotal, tax rate)`.
///
/// Shared by the open cart and by partial refunds, which reprice the
/// remaining snapshot lines under the sale's original promo.
///
/// ## Example
/// ```rust
/// use till_core::checkout::price_lines;
/// use till_core::money::Money;
/// use till_core::promotion::PromoRule;
/// use till_core::types::TaxRate;
///
/// let (_, totals) = price_lines(
///     &[(Money::from_cents(10_000), TaxRate::from_bps(1000))],
///     Some(PromoRule::percent(500)),
/// );
/// assert_eq!(totals.discount_cents, 500);
/// assert_eq!(totals.tax_cents, 950);
/// assert_eq!(totals.total_cents, 10_450);
/// ```
pub fn price_lines(lines: &[(Money, TaxRate)], promo: Option<PromoRule>) -> (Vec<LineCharge>, Totals) {
    let subtotal: Money = lines.iter().map(|(sub, _)| *sub).sum();
    let discount = promo
        .map(|rule| rule.discount_for(subtotal))
        .unwrap_or_else(Money::zero);

    let weights: Vec<i64> = lines.iter().map(|(sub, _)| sub.cents()).collect();
    let shares = discount.allocate(&weights);

    let charges: Vec<LineCharge> = lines
        .iter()
        .zip(shares)
        .map(|((sub, rate), share)| LineCharge {
            discount: share,
            tax: (*sub - share).non_negative().calculate_tax(*rate),
        })
        .collect();

    let tax: Money = charges.iter().map(|c| c.tax).sum();
    let totals = Totals {
        subtotal_cents: subtotal.cents(),
        discount_cents: discount.cents(),
        tax_cents: tax.cents(),
        total_cents: (subtotal - discount + tax).cents(),
    };
    (charges, totals)
}

// =============================================================================
// Completed Sale
// =============================================================================

/// Everything the database needs to persist a finished transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSale {
    pub record: SaleRecord,
    pub lines: Vec<SaleLine>,
    pub payments: Vec<SalePayment>,
    pub points_earned: LoyaltyPoints,
    /// Points debited by loyalty tenders.
    pub points_redeemed: LoyaltyPoints,
}

impl CompletedSale {
    pub fn change(&self) -> Money {
        Money::from_cents(self.record.change_cents)
    }

    pub fn into_sale(self) -> Sale {
        Sale {
            record: self.record,
            lines: self.lines,
            payments: self.payments,
        }
    }
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Clone)]
pub struct Checkout {
    id: String,
    cashier: String,
    started_at: DateTime<Utc>,
    items: Vec<CartItem>,
    promo: Option<(String, PromoRule)>,
    customer: Option<Customer>,
    payments: Vec<Payment>,
    totals: Totals,
}

impl Checkout {
    /// Opens an empty transaction for `cashier`.
    pub fn start(cashier: impl Into<String>) -> Self {
        Checkout {
            id: uuid::Uuid::new_v4().to_string(),
            cashier: cashier.into(),
            started_at: Utc::now(),
            items: Vec::new(),
            promo: None,
            customer: None,
            payments: Vec::new(),
            totals: Totals::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cashier(&self) -> &str {
        &self.cashier
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn promo_code(&self) -> Option<&str> {
        self.promo.as_ref().map(|(code, _)| code.as_str())
    }

    pub fn customer(&self) -> Option<&Customer> {
        self.customer.as_ref()
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn paid(&self) -> Money {
        let cents = self
            .payments
            .iter()
            .fold(0i64, |acc, p| acc.saturating_add(p.amount_cents));
        Money::from_cents(cents)
    }

    /// Grand total still owed, never negative.
    pub fn balance_due(&self) -> Money {
        (self.totals.total() - self.paid()).non_negative()
    }

    /// Sum of reserved units per barcode, as held against the inventory.
    pub fn reserved(&self, barcode: &str) -> i64 {
        self.items
            .iter()
            .filter(|i| i.barcode == barcode)
            .map(|i| i.quantity)
            .sum()
    }

    // -------------------------------------------------------------------------
    // Cart mutation
    // -------------------------------------------------------------------------

    /// Reserves `qty` of `barcode` and adds it to the cart.
    ///
    /// A barcode already in the cart grows its existing line.
    pub fn add_item(&mut self, inventory: &mut Inventory, barcode: &str, qty: i64) -> CoreResult<&CartItem> {
        validate_quantity(qty)?;
        let barcode = barcode.trim();

        let product = inventory
            .find_by_barcode(barcode)
            .ok_or_else(|| CoreError::ProductNotFound(barcode.to_string()))?
            .clone();

        let existing = self.items.iter().position(|i| i.barcode == product.barcode);
        match existing {
            Some(idx) => {
                let merged = self.items[idx].quantity + qty;
                if merged > MAX_ITEM_QUANTITY {
                    return Err(CoreError::QuantityTooLarge {
                        requested: merged,
                        max: MAX_ITEM_QUANTITY,
                    });
                }
            }
            None => {
                if validate_cart_size(self.items.len()).is_err() {
                    return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
                }
            }
        }

        inventory.reserve(&product.barcode, qty)?;

        let idx = match existing {
            Some(idx) => {
                self.items[idx].quantity += qty;
                idx
            }
            None => {
                self.items.push(CartItem {
                    barcode: product.barcode.clone(),
                    name: product.name.clone(),
                    unit_price_cents: product.price_cents,
                    tax_rate_bps: product.tax_rate_bps,
                    quantity: qty,
                    discount_cents: 0,
                    tax_cents: 0,
                });
                self.items.len() - 1
            }
        };

        self.recalculate_totals();
        Ok(&self.items[idx])
    }

    /// Removes the 1-based cart line `line_no` and releases its stock.
    pub fn remove_line(&mut self, inventory: &mut Inventory, line_no: usize) -> CoreResult<CartItem> {
        let len = self.items.len();
        if line_no == 0 || line_no > len {
            return Err(CoreError::LineNotFound { index: line_no, len });
        }

        let item = &self.items[line_no - 1];
        inventory.release(&item.barcode, item.quantity)?;

        let removed = self.items.remove(line_no - 1);
        self.recalculate_totals();
        Ok(removed)
    }

    /// Releases every line and empties the cart. Promo, customer and
    /// payments are kept.
    pub fn clear(&mut self, inventory: &mut Inventory) -> CoreResult<()> {
        if let Some(missing) = self
            .items
            .iter()
            .find(|i| inventory.find_by_barcode(&i.barcode).is_none())
        {
            return Err(CoreError::ProductNotFound(missing.barcode.clone()));
        }

        for item in self.items.drain(..) {
            inventory.release(&item.barcode, item.quantity)?;
        }
        self.recalculate_totals();
        Ok(())
    }

    /// Releases everything this checkout holds. Used when abandoning it.
    pub fn abandon(mut self, inventory: &mut Inventory) -> CoreResult<()> {
        self.clear(inventory)
    }

    pub fn apply_promo(&mut self, catalog: &PromotionCatalog, code: &str) -> CoreResult<()> {
        let rule = catalog.lookup(code)?;
        self.promo = Some((PromotionCatalog::normalize(code), rule));
        self.recalculate_totals();
        Ok(())
    }

    pub fn clear_promo(&mut self) {
        self.promo = None;
        self.recalculate_totals();
    }

    pub fn attach_customer(&mut self, customer: Customer) {
        self.customer = Some(customer);
    }

    pub fn detach_customer(&mut self) -> Option<Customer> {
        self.customer.take()
    }

    /// Records a tender. Amounts must be positive and at most
    /// [`MAX_AMOUNT_CENTS`](crate::MAX_AMOUNT_CENTS) each.
    pub fn add_payment(&mut self, payment: Payment) -> CoreResult<()> {
        validate_payment_amount(payment.amount_cents).map_err(|e| CoreError::InvalidPaymentAmount {
            reason: e.to_string(),
        })?;
        self.payments.push(payment);
        Ok(())
    }

    pub fn clear_payments(&mut self) {
        self.payments.clear();
    }

    /// Recomputes line discounts, line taxes and totals from the lines.
    pub fn recalculate_totals(&mut self) {
        let inputs: Vec<(Money, TaxRate)> = self
            .items
            .iter()
            .map(|i| (i.line_subtotal(), i.tax_rate()))
            .collect();
        let (charges, totals) = price_lines(&inputs, self.promo.as_ref().map(|(_, rule)| *rule));

        for (item, charge) in self.items.iter_mut().zip(charges) {
            item.discount_cents = charge.discount.cents();
            item.tax_cents = charge.tax.cents();
        }
        self.totals = totals;
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    /// Validates tenders against the grand total and builds the sale to
    /// persist. The checkout itself is left untouched so a failed write can
    /// be retried.
    ///
    /// ## Checks
    /// 1. cart not empty
    /// 2. every payment positive
    /// 3. loyalty tenders need a customer with enough points
    /// 4. `paid + 0.01 >= grand`
    pub fn complete(&self, at: DateTime<Utc>) -> CoreResult<CompletedSale> {
        if self.items.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        if let Some(bad) = self.payments.iter().find(|p| p.amount_cents <= 0) {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("{} must be greater than zero", bad.amount()),
            });
        }

        let loyalty_tender = Money::from_cents(
            self.payments
                .iter()
                .filter(|p| p.method == PaymentMethod::Loyalty)
                .fold(0i64, |acc, p| acc.saturating_add(p.amount_cents)),
        );
        let points_redeemed = LoyaltyPoints::needed_for(loyalty_tender);
        if loyalty_tender.is_positive() {
            let customer = self.customer.as_ref().ok_or(CoreError::NoCustomerForLoyalty)?;
            if customer.points() < points_redeemed {
                return Err(CoreError::InsufficientLoyaltyPoints {
                    available: customer.points().to_string(),
                    requested: points_redeemed.to_string(),
                });
            }
        }

        let grand = self.totals.total();
        let paid = self.paid();
        if paid.cents() + PAYMENT_EPSILON_CENTS < grand.cents() {
            return Err(CoreError::InsufficientPayment {
                paid: paid.to_string(),
                due: grand.to_string(),
            });
        }
        let change = (paid - grand).non_negative();

        let points_earned = match &self.customer {
            Some(_) => LoyaltyPoints::earned_on(grand),
            None => LoyaltyPoints::zero(),
        };

        let record = SaleRecord {
            id: self.id.clone(),
            cashier: self.cashier.clone(),
            customer_id: self.customer.as_ref().map(|c| c.id.clone()),
            customer_phone: self.customer.as_ref().map(|c| c.phone.clone()),
            promo_code: self.promo_code().map(str::to_string),
            subtotal_cents: self.totals.subtotal_cents,
            discount_cents: self.totals.discount_cents,
            tax_cents: self.totals.tax_cents,
            total_cents: self.totals.total_cents,
            paid_cents: paid.cents(),
            change_cents: change.cents(),
            points_earned: points_earned.hundredths(),
            refunded: false,
            created_at: at,
            updated_at: at,
        };

        let lines = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| SaleLine {
                sale_id: self.id.clone(),
                line_no: i as i64 + 1,
                barcode: item.barcode.clone(),
                name: item.name.clone(),
                unit_price_cents: item.unit_price_cents,
                tax_rate_bps: item.tax_rate_bps,
                quantity: item.quantity,
                discount_cents: item.discount_cents,
                tax_cents: item.tax_cents,
                refunded: false,
            })
            .collect();

        let payments = self
            .payments
            .iter()
            .enumerate()
            .map(|(i, p)| SalePayment {
                sale_id: self.id.clone(),
                seq: i as i64 + 1,
                method: p.method,
                amount_cents: p.amount_cents,
            })
            .collect();

        Ok(CompletedSale {
            record,
            lines,
            payments,
            points_earned,
            points_redeemed,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
