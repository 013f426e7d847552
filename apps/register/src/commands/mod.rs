//! # Register Commands
//!
//! One async function per register operation. The shell parses a line and
//! calls exactly one of these.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs        ◄─── You are here (exports)
//! ├── session.rs    ◄─── login, logout
//! ├── cart.rs       ◄─── cart lines, promo, customer
//! ├── sale.rs       ◄─── payments, completion, sale lookup
//! ├── refund.rs     ◄─── full and partial refunds, refund log
//! ├── customer.rs   ◄─── customer list and edits
//! └── inventory.rs  ◄─── product search, low stock, restock
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "add milk 2"                                                           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  shell::parse ──► Command::Add { query: "milk", qty: 2 }                │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  cart::add_to_cart(&state, "milk", 2)                                   │
//! │      -> Result<CartResponse, ApiError>                                  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  rendered as text, or as JSON with --json                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Every command takes `&AppState` and returns `Result<_, ApiError>`.
//! - Database work happens outside the state locks; locks are taken in
//!   short synchronous closures before or after each `.await`.
//! - Responses are `Serialize` DTOs in camelCase.

pub mod cart;
pub mod customer;
pub mod inventory;
pub mod refund;
pub mod sale;
pub mod session;

pub use cart::CartResponse;
pub use customer::CustomerDto;
pub use inventory::{ProductDto, RestockResponse};
pub use refund::{RefundLogDto, RefundResponse};
pub use sale::{CompleteSaleResponse, SaleDto, SaleSummaryDto};
pub use session::UserDto;

#[cfg(test)]
pub(crate) mod test_support {
    use till_core::{Inventory, Money, Product, TaxRate};
    use till_db::{Database, DbConfig};

    use crate::state::{AppState, ConfigState, DbState, InventoryState};

    /// Register state over a fresh in-memory database holding three products.
    pub async fn test_state() -> AppState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = [
            Product::new("9000", "Test Item", Money::from_cents(10_000), 10, 2, TaxRate::from_bps(1000)),
            Product::new("1001", "Milk 1L", Money::from_cents(25_000), 30, 5, TaxRate::from_bps(1000)),
            Product::new("1012", "Soap Bar", Money::from_cents(12_000), 1, 3, TaxRate::from_bps(500)),
        ];
        for product in &products {
            db.products().upsert(product).await.unwrap();
        }

        let inventory = Inventory::from_products(db.products().list_all().await.unwrap());
        AppState::new(
            DbState::new(db),
            InventoryState::new(inventory),
            ConfigState::default(),
        )
    }

    /// Same as [`test_state`] with `username` already logged in.
    pub async fn logged_in(username: &str) -> AppState {
        let state = test_state().await;
        let password = match username {
            "admin" => "1234",
            "manager" => "2222",
            _ => "1111",
        };
        super::session::login(&state, username, password).unwrap();
        state
    }

    pub fn memory_stock(state: &AppState, barcode: &str) -> i64 {
        state
            .inventory
            .with_inventory(|inv| inv.find_by_barcode(barcode).unwrap().stock)
    }

    pub async fn db_stock(state: &AppState, barcode: &str) -> i64 {
        state
            .db
            .inner()
            .products()
            .get(barcode)
            .await
            .unwrap()
            .unwrap()
            .stock
    }
}
