//! # Cart Commands
//!
//! Building up the open checkout: lines, promo code and customer.
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Lifecycle                                       │
//! │                                                                         │
//! │  ┌──────────┐     ┌──────────┐     ┌──────────┐     ┌──────────┐       │
//! │  │  Empty   │────►│ In Cart  │────►│ Tendered │────►│ Completed│       │
//! │  │  Cart    │     │          │     │          │     │   Sale   │       │
//! │  └──────────┘     └──────────┘     └──────────┘     └──────────┘       │
//! │                        │                 │                              │
//! │                   add_to_cart       complete_sale                      │
//! │                   remove_line       (sale.rs)                          │
//! │                   apply_promo                                           │
//! │                   attach_customer                                       │
//! │                        │                                                │
//! │                        ▼                                                │
//! │                   clear_cart ──────────────────────►                   │
//! │                                                      (back to empty)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation reserves or releases stock in the in-memory inventory. A
//! rejected mutation leaves both the cart and the inventory untouched.

use serde::Serialize;
use tracing::debug;

use till_core::validation::{validate_phone, validate_search_query};
use till_core::{CartItem, Checkout, CoreError, Payment, Totals};

use crate::commands::customer::CustomerDto;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// DTOs
// =============================================================================

/// One cart line as shown to the cashier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineDto {
    /// 1-based, as typed in `remove <n>`
    pub line_no: usize,
    pub barcode: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
    pub quantity: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
}

impl CartLineDto {
    fn new(line_no: usize, item: &CartItem) -> Self {
        CartLineDto {
            line_no,
            barcode: item.barcode.clone(),
            name: item.name.clone(),
            unit_price_cents: item.unit_price_cents,
            tax_rate_bps: item.tax_rate_bps,
            quantity: item.quantity,
            discount_cents: item.discount_cents,
            tax_cents: item.tax_cents,
            line_total_cents: item.line_total().cents(),
        }
    }
}

/// The open checkout: lines, totals, promo, customer and tenders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    /// `None` until the first line is added.
    pub checkout_id: Option<String>,
    pub items: Vec<CartLineDto>,
    pub totals: Totals,
    pub promo_code: Option<String>,
    pub customer: Option<CustomerDto>,
    pub payments: Vec<Payment>,
    pub paid_cents: i64,
    pub balance_due_cents: i64,
}

impl CartResponse {
    pub fn empty() -> Self {
        CartResponse {
            checkout_id: None,
            items: Vec::new(),
            totals: Totals::default(),
            promo_code: None,
            customer: None,
            payments: Vec::new(),
            paid_cents: 0,
            balance_due_cents: 0,
        }
    }
}

impl From<&Checkout> for CartResponse {
    fn from(checkout: &Checkout) -> Self {
        CartResponse {
            checkout_id: Some(checkout.id().to_string()),
            items: checkout
                .items()
                .iter()
                .enumerate()
                .map(|(i, item)| CartLineDto::new(i + 1, item))
                .collect(),
            totals: checkout.totals(),
            promo_code: checkout.promo_code().map(str::to_string),
            customer: checkout.customer().map(CustomerDto::from),
            payments: checkout.payments().to_vec(),
            paid_cents: checkout.paid().cents(),
            balance_due_cents: checkout.balance_due().cents(),
        }
    }
}

fn cart_view(checkout: Option<&Checkout>) -> CartResponse {
    checkout.map(CartResponse::from).unwrap_or_else(CartResponse::empty)
}

// =============================================================================
// Commands
// =============================================================================

/// Gets the current cart contents.
pub fn get_cart(state: &AppState) -> Result<CartResponse, ApiError> {
    state.session.with_session(|session| {
        session.user()?;
        Ok(cart_view(session.checkout.as_ref()))
    })
}

/// Adds `qty` of the product matching `query` to the cart.
///
/// ## Behavior
/// - `query` is a barcode, or part of a product name
/// - A product already in the cart grows its existing line
/// - The price and tax rate are frozen at this moment
pub fn add_to_cart(state: &AppState, query: &str, qty: i64) -> Result<CartResponse, ApiError> {
    let query = validate_search_query(query)?;
    debug!(query = %query, qty, "add_to_cart command");

    state.with_register_mut(|inventory, session| {
        let checkout = session.checkout_mut()?;
        let barcode = inventory
            .find_by_query(&query)
            .map(|p| p.barcode.clone())
            .ok_or_else(|| CoreError::ProductNotFound(query.clone()))?;

        checkout.add_item(inventory, &barcode, qty)?;
        Ok(CartResponse::from(&*checkout))
    })
}

/// Removes the 1-based line `line_no` and releases its stock.
pub fn remove_line(state: &AppState, line_no: usize) -> Result<CartResponse, ApiError> {
    debug!(line_no, "remove_line command");

    state.with_register_mut(|inventory, session| {
        let checkout = session.checkout_mut()?;
        let removed = checkout.remove_line(inventory, line_no)?;
        debug!(barcode = %removed.barcode, qty = removed.quantity, "Released cart line");
        Ok(CartResponse::from(&*checkout))
    })
}

/// Releases every line. Promo, customer and payments are kept.
pub fn clear_cart(state: &AppState) -> Result<CartResponse, ApiError> {
    debug!("clear_cart command");

    state.with_register_mut(|inventory, session| {
        session.user()?;
        match session.checkout.as_mut() {
            Some(checkout) => {
                checkout.clear(inventory)?;
                Ok(CartResponse::from(&*checkout))
            }
            None => Ok(CartResponse::empty()),
        }
    })
}

/// Applies a promo code. Unknown codes are rejected.
pub fn apply_promo(state: &AppState, code: &str) -> Result<CartResponse, ApiError> {
    debug!(code = %code, "apply_promo command");
    let catalog = &state.config.promotions;

    state.session.with_session_mut(|session| {
        let checkout = session.checkout_mut()?;
        checkout.apply_promo(catalog, code)?;
        Ok(CartResponse::from(&*checkout))
    })
}

pub fn clear_promo(state: &AppState) -> Result<CartResponse, ApiError> {
    state.session.with_session_mut(|session| {
        let checkout = session.checkout_mut()?;
        checkout.clear_promo();
        Ok(CartResponse::from(&*checkout))
    })
}

/// Attaches the customer with `phone`, creating a first-seen record for a
/// new number.
pub async fn attach_customer(state: &AppState, phone: &str) -> Result<CartResponse, ApiError> {
    validate_phone(phone)?;
    state.session.with_session(|s| s.user().map(|_| ()))?;

    let customer = state.db.inner().customers().attach_or_create(phone).await?;
    debug!(phone = %customer.phone, points = %customer.points(), "attach_customer command");

    state.session.with_session_mut(|session| {
        let checkout = session.checkout_mut()?;
        checkout.attach_customer(customer);
        Ok(CartResponse::from(&*checkout))
    })
}

pub fn detach_customer(state: &AppState) -> Result<CartResponse, ApiError> {
    state.session.with_session_mut(|session| {
        let checkout = session.checkout_mut()?;
        checkout.detach_customer();
        Ok(CartResponse::from(&*checkout))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{logged_in, memory_stock, test_state};
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_cart_requires_login() {
        let state = test_state().await;
        assert_eq!(get_cart(&state).unwrap_err().code, ErrorCode::Unauthorized);
        assert_eq!(
            add_to_cart(&state, "9000", 1).unwrap_err().code,
            ErrorCode::Unauthorized
        );
        assert_eq!(memory_stock(&state, "9000"), 10);
    }

    #[tokio::test]
    async fn test_add_by_name_merges_lines() {
        let state = logged_in("cashier1").await;

        add_to_cart(&state, "milk", 2).unwrap();
        let cart = add_to_cart(&state, "1001", 3).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.items[0].line_no, 1);
        assert_eq!(memory_stock(&state, "1001"), 25);
    }

    #[tokio::test]
    async fn test_rejected_add_changes_nothing() {
        let state = logged_in("cashier1").await;
        add_to_cart(&state, "1012", 1).unwrap();

        let err = add_to_cart(&state, "1012", 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);

        let err = add_to_cart(&state, "no such thing", 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = add_to_cart(&state, "9000", 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let cart = get_cart(&state).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(memory_stock(&state, "1012"), 0);
        assert_eq!(memory_stock(&state, "9000"), 10);
    }

    #[tokio::test]
    async fn test_remove_and_clear_release_stock() {
        let state = logged_in("cashier1").await;
        add_to_cart(&state, "9000", 2).unwrap();
        add_to_cart(&state, "1001", 1).unwrap();

        let cart = remove_line(&state, 1).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].barcode, "1001");
        assert_eq!(memory_stock(&state, "9000"), 10);

        assert_eq!(remove_line(&state, 5).unwrap_err().code, ErrorCode::CartError);

        let cart = clear_cart(&state).unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(memory_stock(&state, "1001"), 30);
    }

    #[tokio::test]
    async fn test_promo_worked_example() {
        let state = logged_in("cashier1").await;
        add_to_cart(&state, "9000", 1).unwrap();

        let cart = apply_promo(&state, "pct5").unwrap();
        assert_eq!(cart.promo_code.as_deref(), Some("PCT5"));
        assert_eq!(cart.totals.discount_cents, 500);
        assert_eq!(cart.totals.tax_cents, 950);
        assert_eq!(cart.totals.total_cents, 10_450);

        let err = apply_promo(&state, "BOGUS").unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
        assert_eq!(get_cart(&state).unwrap().promo_code.as_deref(), Some("PCT5"));

        let cart = clear_promo(&state).unwrap();
        assert_eq!(cart.totals.total_cents, 11_000);
    }

    #[tokio::test]
    async fn test_attach_customer_creates_first_seen() {
        let state = logged_in("cashier1").await;

        let cart = attach_customer(&state, "03001234567").await.unwrap();
        let customer = cart.customer.unwrap();
        assert_eq!(customer.name, "Unknown");
        assert_eq!(customer.contact, "03001234567");

        let stored = state
            .db
            .inner()
            .customers()
            .get_by_phone("03001234567")
            .await
            .unwrap();
        assert!(stored.is_some());

        let cart = detach_customer(&state).unwrap();
        assert!(cart.customer.is_none());
    }
}
