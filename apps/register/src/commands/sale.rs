//! # Sale Commands
//!
//! Tendering, completing the sale, and looking sales up afterwards.
//!
//! ## Completion Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    complete_sale                                        │
//! │                                                                         │
//! │  1. session lock ──► Checkout::complete(now)                            │
//! │     (empty cart, bad tenders, short payment rejected here)              │
//! │         │ lock released                                                 │
//! │         ▼                                                               │
//! │  2. SaleRepository::record_completed_sale  (one SQL transaction)        │
//! │     header + lines + payments + stock debit + loyalty points            │
//! │         │                                                               │
//! │         ├── Err ──► checkout and reservations stay, cashier can retry   │
//! │         ▼                                                               │
//! │  3. session lock ──► drop the checkout (if it is still the same one)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use till_core::{CoreError, Money, Payment, PaymentMethod, Permission, Sale, SaleLine, SalePayment, SaleRecord};

use crate::commands::cart::CartResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Sales listed when no limit is given.
pub const DEFAULT_SALE_LIST_LIMIT: u32 = 20;

// =============================================================================
// DTOs
// =============================================================================

/// Sale header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleSummaryDto {
    pub id: String,
    pub cashier: String,
    pub customer_phone: Option<String>,
    pub promo_code: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub change_cents: i64,
    pub points_earned: i64,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&SaleRecord> for SaleSummaryDto {
    fn from(r: &SaleRecord) -> Self {
        SaleSummaryDto {
            id: r.id.clone(),
            cashier: r.cashier.clone(),
            customer_phone: r.customer_phone.clone(),
            promo_code: r.promo_code.clone(),
            subtotal_cents: r.subtotal_cents,
            discount_cents: r.discount_cents,
            tax_cents: r.tax_cents,
            total_cents: r.total_cents,
            paid_cents: r.paid_cents,
            change_cents: r.change_cents,
            points_earned: r.points_earned,
            refunded: r.refunded,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineDto {
    pub line_no: i64,
    pub barcode: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
    pub refunded: bool,
}

impl From<&SaleLine> for SaleLineDto {
    fn from(l: &SaleLine) -> Self {
        SaleLineDto {
            line_no: l.line_no,
            barcode: l.barcode.clone(),
            name: l.name.clone(),
            unit_price_cents: l.unit_price_cents,
            quantity: l.quantity,
            discount_cents: l.discount_cents,
            tax_cents: l.tax_cents,
            line_total_cents: l.line_total().cents(),
            refunded: l.refunded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePaymentDto {
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

impl From<&SalePayment> for SalePaymentDto {
    fn from(p: &SalePayment) -> Self {
        SalePaymentDto {
            method: p.method,
            amount_cents: p.amount_cents,
        }
    }
}

/// A sale with its lines and tenders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDto {
    #[serde(flatten)]
    pub summary: SaleSummaryDto,
    pub lines: Vec<SaleLineDto>,
    pub payments: Vec<SalePaymentDto>,
}

impl From<&Sale> for SaleDto {
    fn from(sale: &Sale) -> Self {
        SaleDto {
            summary: SaleSummaryDto::from(&sale.record),
            lines: sale.lines.iter().map(SaleLineDto::from).collect(),
            payments: sale.payments.iter().map(SalePaymentDto::from).collect(),
        }
    }
}

/// Result of a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSaleResponse {
    pub sale: SaleDto,
    pub change_cents: i64,
    /// Hundredths of a point
    pub points_earned: i64,
    /// Hundredths of a point
    pub points_redeemed: i64,
}

// =============================================================================
// Tendering
// =============================================================================

/// Records a tender against the open checkout.
pub fn add_payment(state: &AppState, method: PaymentMethod, amount: Money) -> Result<CartResponse, ApiError> {
    debug!(method = %method, amount = %amount, "add_payment command");

    state.session.with_session_mut(|session| {
        let checkout = session.checkout_mut()?;
        checkout.add_payment(Payment::new(method, amount))?;
        Ok(CartResponse::from(&*checkout))
    })
}

pub fn clear_payments(state: &AppState) -> Result<CartResponse, ApiError> {
    state.session.with_session_mut(|session| {
        let checkout = session.checkout_mut()?;
        checkout.clear_payments();
        Ok(CartResponse::from(&*checkout))
    })
}

// =============================================================================
// Completion
// =============================================================================

/// Completes the open checkout and persists it.
///
/// ## Errors
/// - `CART_ERROR` - nothing in the cart
/// - `PAYMENT_ERROR` - tenders short of the total, or bad loyalty tender
/// - `INSUFFICIENT_STOCK` - the database copy of stock ran out
///
/// On any error the checkout is left as it was.
pub async fn complete_sale(state: &AppState) -> Result<CompleteSaleResponse, ApiError> {
    let completed = state.session.with_session(|session| {
        session.authorize(Permission::Sale)?;
        let checkout = session.checkout.as_ref().ok_or(CoreError::EmptyCart)?;
        checkout.complete(Utc::now())
    })?;

    state
        .db
        .inner()
        .sales()
        .record_completed_sale(&completed)
        .await?;

    let sale_id = completed.record.id.clone();
    state.session.with_session_mut(|session| {
        if session.checkout.as_ref().map(|c| c.id()) == Some(sale_id.as_str()) {
            session.checkout = None;
        }
    });

    info!(
        target: "audit",
        event = "sale_completed",
        sale_id = %sale_id,
        cashier = %completed.record.cashier,
        total_cents = completed.record.total_cents,
        paid_cents = completed.record.paid_cents,
        change_cents = completed.record.change_cents
    );

    Ok(CompleteSaleResponse {
        change_cents: completed.change().cents(),
        points_earned: completed.points_earned.hundredths(),
        points_redeemed: completed.points_redeemed.hundredths(),
        sale: SaleDto::from(&completed.into_sale()),
    })
}

// =============================================================================
// Lookup
// =============================================================================

pub async fn get_sale(state: &AppState, id: &str) -> Result<SaleDto, ApiError> {
    state.session.with_session(|s| s.user().map(|_| ()))?;

    let sale = state
        .db
        .inner()
        .sales()
        .get_sale(id.trim())
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(id.trim().to_string()))?;
    Ok(SaleDto::from(&sale))
}

/// Most recent sales first.
pub async fn list_sales(state: &AppState, limit: Option<u32>) -> Result<Vec<SaleSummaryDto>, ApiError> {
    state.session.with_session(|s| s.user().map(|_| ()))?;

    let records = state
        .db
        .inner()
        .sales()
        .list_recent(limit.unwrap_or(DEFAULT_SALE_LIST_LIMIT))
        .await?;
    Ok(records.iter().map(SaleSummaryDto::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::{add_to_cart, apply_promo, attach_customer};
    use crate::commands::test_support::{db_stock, logged_in, memory_stock};
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_complete_worked_example() {
        let state = logged_in("cashier1").await;
        add_to_cart(&state, "9000", 1).unwrap();
        apply_promo(&state, "PCT5").unwrap();
        add_payment(&state, PaymentMethod::Cash, Money::from_cents(5_000)).unwrap();
        let cart = add_payment(&state, PaymentMethod::Card, Money::from_cents(6_000)).unwrap();
        assert_eq!(cart.balance_due_cents, 0);

        let done = complete_sale(&state).await.unwrap();
        assert_eq!(done.sale.summary.total_cents, 10_450);
        assert_eq!(done.change_cents, 550);
        assert_eq!(done.sale.payments.len(), 2);

        assert_eq!(memory_stock(&state, "9000"), 9);
        assert_eq!(db_stock(&state, "9000").await, 9);
        assert!(state.session.with_session(|s| s.checkout.is_none()));

        let fetched = get_sale(&state, &done.sale.summary.id).await.unwrap();
        assert_eq!(fetched.lines, done.sale.lines);
        assert_eq!(fetched.payments, done.sale.payments);
        assert_eq!(fetched.summary.discount_cents, 500);
        assert_eq!(list_sales(&state, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_short_payment_keeps_checkout() {
        let state = logged_in("cashier1").await;
        add_to_cart(&state, "9000", 1).unwrap();
        add_payment(&state, PaymentMethod::Cash, Money::from_cents(10_000)).unwrap();

        let err = complete_sale(&state).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentError);
        assert_eq!(memory_stock(&state, "9000"), 9);
        assert_eq!(db_stock(&state, "9000").await, 10);
        assert_eq!(list_sales(&state, None).await.unwrap().len(), 0);

        add_payment(&state, PaymentMethod::Cash, Money::from_cents(1_000)).unwrap();
        complete_sale(&state).await.unwrap();
        assert_eq!(db_stock(&state, "9000").await, 9);
    }

    #[tokio::test]
    async fn test_empty_cart_and_bad_tender() {
        let state = logged_in("cashier1").await;
        assert_eq!(complete_sale(&state).await.unwrap_err().code, ErrorCode::CartError);

        let err = add_payment(&state, PaymentMethod::Cash, Money::zero()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentError);
    }

    #[tokio::test]
    async fn test_loyalty_earn_and_redeem() {
        let state = logged_in("cashier1").await;
        attach_customer(&state, "5551234").await.unwrap();
        add_to_cart(&state, "1001", 4).unwrap(); // 1000.00 + 100.00 tax
        add_payment(&state, PaymentMethod::Cash, Money::from_cents(110_000)).unwrap();
        let done = complete_sale(&state).await.unwrap();
        assert_eq!(done.points_earned, 1_100); // 11 points

        attach_customer(&state, "5551234").await.unwrap();
        add_to_cart(&state, "9000", 1).unwrap();
        add_payment(&state, PaymentMethod::Loyalty, Money::from_cents(1_000)).unwrap();
        add_payment(&state, PaymentMethod::Cash, Money::from_cents(10_000)).unwrap();
        let done = complete_sale(&state).await.unwrap();
        assert_eq!(done.points_redeemed, 1_000);

        let customer = state
            .db
            .inner()
            .customers()
            .get_by_phone("5551234")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.loyalty_points, 1_100 - 1_000 + done.points_earned);
    }

    #[tokio::test]
    async fn test_loyalty_without_customer_rejected() {
        let state = logged_in("cashier1").await;
        add_to_cart(&state, "9000", 1).unwrap();
        add_payment(&state, PaymentMethod::Loyalty, Money::from_cents(11_000)).unwrap();

        let err = complete_sale(&state).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentError);
    }

    #[tokio::test]
    async fn test_unknown_sale() {
        let state = logged_in("cashier1").await;
        let err = get_sale(&state, "missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
