//! # Domain Types
//!
//! Core domain types used throughout Till POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   SaleRecord    │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  barcode (key)  │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name           │   │  cashier        │   │  phone (key)    │       │
//! │  │  price_cents    │   │  promo_code     │   │  name, contact  │       │
//! │  │  stock          │   │  total_cents    │   │  loyalty_points │       │
//! │  │  tax_rate_bps   │   │  refunded       │   └─────────────────┘       │
//! │  └─────────────────┘   └────────┬────────┘                              │
//! │                                 │ 1..n                                  │
//! │                   ┌─────────────┴─────────────┐                         │
//! │                   ▼                           ▼                         │
//! │          ┌─────────────────┐         ┌─────────────────┐               │
//! │          │    SaleLine     │         │   SalePayment   │               │
//! │          │  line_no        │         │  seq            │               │
//! │          │  snapshot price │         │  method         │               │
//! │          │  refunded       │         │  amount_cents   │               │
//! │          └─────────────────┘         └─────────────────┘               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Sale lines freeze the product's name, price and tax rate at the moment of
//! sale. Refunds recompute totals from these snapshots, never from the
//! current product row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::Role;
use crate::error::ValidationError;
use crate::money::{LoyaltyPoints, Money};
use crate::refund::RefundKind;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1000 bps = 10%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Renders as a percentage, e.g. `10.00%`.
impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Parses a fraction such as `0.10` (10%) with up to four decimal places.
///
/// This is the notation of the legacy inventory file.
impl FromStr for TaxRate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidFormat {
            field: "tax rate".to_string(),
            reason: "expected a fraction like 0.10".to_string(),
        };

        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if (whole.is_empty() && frac.is_empty())
            || frac.len() > 4
            || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_bps: u32 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<4}", frac);
            padded.parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(10_000)
            .and_then(|w| w.checked_add(frac_bps))
            .map(TaxRate)
            .ok_or_else(invalid)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale, keyed by barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Barcode - the business key scanned at the register.
    pub barcode: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Price in cents.
    pub price_cents: i64,

    /// Units on hand, net of reservations held by the open cart.
    pub stock: i64,

    /// Stock at or below this level is reported as low.
    pub low_stock_threshold: i64,

    /// Tax rate in basis points (1000 = 10%).
    pub tax_rate_bps: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product stamped with the current time.
    pub fn new(
        barcode: impl Into<String>,
        name: impl Into<String>,
        price: Money,
        stock: i64,
        low_stock_threshold: i64,
        tax_rate: TaxRate,
    ) -> Self {
        let now = Utc::now();
        Product {
            barcode: barcode.into(),
            name: name.into(),
            price_cents: price.cents(),
            stock,
            low_stock_threshold,
            tax_rate_bps: tax_rate.bps(),
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Stock is at or below the alert threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a payment was tendered.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Voucher,
    /// Redeems the attached customer's loyalty points (1 point = 1.00).
    Loyalty,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Voucher,
        PaymentMethod::Loyalty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Voucher => "voucher",
            PaymentMethod::Loyalty => "loyalty",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "debit" => Ok(PaymentMethod::Card),
            "voucher" => Ok(PaymentMethod::Voucher),
            "loyalty" | "points" => Ok(PaymentMethod::Loyalty),
            _ => Err(ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: PaymentMethod::ALL.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A tender toward the open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

impl Payment {
    pub fn new(method: PaymentMethod, amount: Money) -> Self {
        Payment {
            method,
            amount_cents: amount.cents(),
        }
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A loyalty customer, keyed by phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub phone: String,
    pub name: String,
    pub contact: String,
    /// Balance in hundredths of a point, never negative.
    pub loyalty_points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a customer record the first time a phone number is seen.
    ///
    /// Name defaults to "Unknown" and contact to the phone number.
    pub fn first_seen(phone: impl Into<String>) -> Self {
        let phone = phone.into();
        Customer::new(phone.clone(), "Unknown", phone)
    }

    pub fn new(
        phone: impl Into<String>,
        name: impl Into<String>,
        contact: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Customer {
            id: uuid::Uuid::new_v4().to_string(),
            phone: phone.into(),
            name: name.into(),
            contact: contact.into(),
            loyalty_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn points(&self) -> LoyaltyPoints {
        LoyaltyPoints::from_hundredths(self.loyalty_points)
    }

    /// Case-insensitive match against id, name, phone and contact.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        [&self.id, &self.name, &self.phone, &self.contact]
            .iter()
            .any(|field| field.to_lowercase().contains(&q))
    }
}

// =============================================================================
// Sale Record
// =============================================================================

/// Header row of a completed transaction.
///
/// `subtotal/discount/tax/total` always describe the lines that are still
/// active. A partial refund rewrites them; `refunded` flips once no active
/// lines remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleRecord {
    pub id: String,
    pub cashier: String,
    pub customer_id: Option<String>,
    pub customer_phone: Option<String>,
    pub promo_code: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub change_cents: i64,
    /// Loyalty earned at completion, in hundredths of a point.
    pub points_earned: i64,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SaleRecord {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A frozen line of a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLine {
    pub sale_id: String,
    /// Stable 1-based position within the sale.
    pub line_no: i64,
    pub barcode: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
    pub quantity: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub refunded: bool,
}

impl SaleLine {
    /// Unit price × quantity, before discount and tax.
    pub fn line_subtotal(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    /// Line subtotal − allocated discount + line tax.
    pub fn line_total(&self) -> Money {
        self.line_subtotal() - Money::from_cents(self.discount_cents)
            + Money::from_cents(self.tax_cents)
    }
}

/// A tender recorded against a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SalePayment {
    pub sale_id: String,
    pub seq: i64,
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

/// A sale with its lines and payments, as looked up for refunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub record: SaleRecord,
    pub lines: Vec<SaleLine>,
    pub payments: Vec<SalePayment>,
}

impl Sale {
    /// Lines not yet refunded, in line order.
    pub fn active_lines(&self) -> impl Iterator<Item = &SaleLine> {
        self.lines.iter().filter(|l| !l.refunded)
    }
}

// =============================================================================
// Refund Log
// =============================================================================

/// One processed refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RefundLogEntry {
    pub id: String,
    pub sale_id: String,
    pub kind: RefundKind,
    pub processed_by: String,
    pub role: Role,
    pub amount_cents: i64,
    /// Human-readable list of refunded lines, e.g. `Milk 1L x2; Soap Bar x1`.
    pub items: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_parse_fraction() {
        assert_eq!("0.10".parse::<TaxRate>().unwrap().bps(), 1000);
        assert_eq!("0.05".parse::<TaxRate>().unwrap().bps(), 500);
        assert_eq!("0.0825".parse::<TaxRate>().unwrap().bps(), 825);
        assert_eq!("0".parse::<TaxRate>().unwrap().bps(), 0);
        assert_eq!("1".parse::<TaxRate>().unwrap().bps(), 10_000);

        assert!("ten".parse::<TaxRate>().is_err());
        assert!("0.12345".parse::<TaxRate>().is_err());
        assert!("".parse::<TaxRate>().is_err());
    }

    #[test]
    fn test_tax_rate_display() {
        assert_eq!(TaxRate::from_bps(1000).to_string(), "10.00%");
        assert_eq!(TaxRate::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("Cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("credit".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!("points".parse::<PaymentMethod>().unwrap(), PaymentMethod::Loyalty);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_low_stock() {
        let mut p = Product::new("1001", "Milk 1L", Money::from_cents(25_000), 6, 5, TaxRate::from_bps(1000));
        assert!(!p.is_low_stock());
        p.stock = 5;
        assert!(p.is_low_stock());
    }

    #[test]
    fn test_customer_first_seen_and_search() {
        let c = Customer::first_seen("03001234567");
        assert_eq!(c.name, "Unknown");
        assert_eq!(c.contact, "03001234567");
        assert_eq!(c.points(), LoyaltyPoints::zero());

        assert!(c.matches("unknown"));
        assert!(c.matches("0300"));
        assert!(!c.matches("alice"));
    }

    #[test]
    fn test_sale_line_totals() {
        let line = SaleLine {
            sale_id: "s".to_string(),
            line_no: 1,
            barcode: "1001".to_string(),
            name: "Milk 1L".to_string(),
            unit_price_cents: 10_000,
            tax_rate_bps: 1000,
            quantity: 1,
            discount_cents: 500,
            tax_cents: 950,
            refunded: false,
        };
        assert_eq!(line.line_subtotal().cents(), 10_000);
        assert_eq!(line.line_total().cents(), 10_450);
    }
}
