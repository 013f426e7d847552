//! # Inventory Commands
//!
//! Product search, low-stock report, restocking and product edits.
//!
//! Searches read the in-memory inventory, so stock shown is what is still
//! available to sell (on hand minus the open cart).
//!
//! ## Restock Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  restock 1012 24                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  authorize(ManageInventory) ── Cashier? ──► FORBIDDEN                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE products SET stock = stock + 24   (persisted first)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Inventory::restock (memory follows)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tracing::{debug, info};

use till_core::validation::{
    validate_barcode, validate_price_cents, validate_product_name, validate_restock_quantity,
    validate_search_query, validate_stock_level, validate_tax_rate_bps,
};
use till_core::{CoreError, Money, Permission, Product, TaxRate};

use crate::error::ApiError;
use crate::state::AppState;

/// Product DTO for the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub barcode: String,
    pub name: String,
    pub price_cents: i64,
    pub tax_rate_bps: u32,
    /// Available to sell
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub low_stock: bool,
}

impl From<&Product> for ProductDto {
    fn from(p: &Product) -> Self {
        ProductDto {
            barcode: p.barcode.clone(),
            name: p.name.clone(),
            price_cents: p.price_cents,
            tax_rate_bps: p.tax_rate_bps,
            stock: p.stock,
            low_stock_threshold: p.low_stock_threshold,
            low_stock: p.is_low_stock(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockResponse {
    pub barcode: String,
    pub added: i64,
    /// Stock in the database
    pub on_hand: i64,
    /// On hand less what the open cart holds
    pub available: i64,
}

/// Products whose barcode or name contains `query`.
pub fn find_products(state: &AppState, query: &str) -> Result<Vec<ProductDto>, ApiError> {
    let query = validate_search_query(query)?;
    debug!(query = %query, "find_products command");

    Ok(state
        .inventory
        .with_inventory(|inv| inv.search(&query).into_iter().map(ProductDto::from).collect()))
}

/// Products at or below their low-stock threshold, by barcode.
pub fn low_stock(state: &AppState) -> Result<Vec<ProductDto>, ApiError> {
    Ok(state
        .inventory
        .with_inventory(|inv| inv.low_stock().into_iter().map(ProductDto::from).collect()))
}

/// Adds delivered units to a product.
pub async fn restock(state: &AppState, barcode: &str, qty: i64) -> Result<RestockResponse, ApiError> {
    let username = state.session.with_session(|s| {
        s.authorize(Permission::ManageInventory)
            .map(|u| u.username.clone())
    })?;
    validate_restock_quantity(qty)?;

    let barcode = barcode.trim();
    let known = state
        .inventory
        .with_inventory(|inv| inv.find_by_barcode(barcode).is_some());
    if !known {
        return Err(CoreError::ProductNotFound(barcode.to_string()).into());
    }

    let on_hand = state.db.inner().products().update_stock(barcode, qty).await?;
    let available = state
        .inventory
        .with_inventory_mut(|inv| inv.restock(barcode, qty))?;

    info!(
        target: "audit",
        event = "restock",
        barcode = %barcode,
        qty,
        on_hand,
        username = %username
    );

    Ok(RestockResponse {
        barcode: barcode.to_string(),
        added: qty,
        on_hand,
        available,
    })
}

/// Adds a product, or changes the name, price, threshold and tax rate of an
/// existing one. A new product starts with no stock.
pub async fn save_product(
    state: &AppState,
    barcode: &str,
    name: &str,
    price: Money,
    low_stock_threshold: i64,
    tax_rate: TaxRate,
) -> Result<ProductDto, ApiError> {
    let username = state.session.with_session(|s| {
        s.authorize(Permission::ManageInventory)
            .map(|u| u.username.clone())
    })?;
    let barcode = barcode.trim();
    validate_barcode(barcode)?;
    validate_product_name(name)?;
    validate_price_cents(price.cents())?;
    validate_stock_level("low stock threshold", low_stock_threshold)?;
    validate_tax_rate_bps(tax_rate.bps())?;

    let draft = Product::new(barcode, name.trim(), price, 0, low_stock_threshold, tax_rate);
    let stored = state.db.inner().products().upsert(&draft).await?;

    let product = state.inventory.with_inventory_mut(|inv| {
        ProductDto::from(inv.upsert_details(
            &stored.barcode,
            &stored.name,
            stored.price(),
            stored.low_stock_threshold,
            stored.tax_rate(),
        ))
    });

    info!(barcode = %product.barcode, by = %username, "Product saved");
    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::add_to_cart;
    use crate::commands::test_support::{db_stock, logged_in, memory_stock};
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_find_and_low_stock() {
        let state = logged_in("cashier1").await;

        let found = find_products(&state, "ilk").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].barcode, "1001");
        assert_eq!(find_products(&state, "").unwrap().len(), 3);

        let low = low_stock(&state).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].barcode, "1012");
    }

    #[tokio::test]
    async fn test_restock_requires_manager() {
        let state = logged_in("cashier1").await;
        let err = restock(&state, "1012", 5).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert_eq!(db_stock(&state, "1012").await, 1);
    }

    #[tokio::test]
    async fn test_restock_persists_and_respects_cart() {
        let state = logged_in("manager").await;
        add_to_cart(&state, "9000", 3).unwrap();

        let res = restock(&state, "9000", 5).await.unwrap();
        assert_eq!(res.on_hand, 15);
        assert_eq!(res.available, 12);
        assert_eq!(db_stock(&state, "9000").await, 15);
        assert_eq!(memory_stock(&state, "9000"), 12);

        let err = restock(&state, "4040", 5).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let err = restock(&state, "9000", 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_save_product_keeps_stock() {
        let state = logged_in("admin").await;

        let updated = save_product(
            &state,
            "1001",
            "Milk 1L Full Cream",
            Money::from_cents(27_500),
            8,
            TaxRate::from_bps(1000),
        )
        .await
        .unwrap();
        assert_eq!(updated.stock, 30);
        assert_eq!(updated.price_cents, 27_500);
        assert_eq!(db_stock(&state, "1001").await, 30);

        let created = save_product(&state, "2001", "Rice 5kg", Money::from_cents(90_000), 2, TaxRate::zero())
            .await
            .unwrap();
        assert_eq!(created.stock, 0);
        assert!(created.low_stock);
        assert_eq!(find_products(&state, "rice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_product_rejects_oversized_price() {
        let state = logged_in("admin").await;
        let too_much = Money::from_cents(till_core::MAX_AMOUNT_CENTS + 1);

        let err = save_product(&state, "1001", "Milk 1L", too_much, 8, TaxRate::from_bps(1000))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        let milk = state.db.inner().products().get("1001").await.unwrap().unwrap();
        assert_eq!(milk.price_cents, 25_000);
    }
}
