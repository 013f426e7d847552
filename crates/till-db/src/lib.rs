//! # till-db
//!
//! SQLite persistence for the Till POS register: the product catalog with
//! its stock counts, customers and their loyalty balances, completed sales,
//! and the refund log. Legacy `inventory.txt` / `customers.txt` files are
//! read and written by [`flatfile`].
//!
//! ```text
//!   register command
//!         │
//!         ▼
//!   Database ──┬── products()     stock deltas are guarded: never below 0
//!   (pool.rs)  ├── customers()    phone is unique, points in hundredths
//!              ├── sales()        sale + lines + payments + stock in one tx
//!              └── refund_log()   append-only, one row per refund
//!         │
//!         ▼
//!   migrations/sqlite/*.sql (embedded at build time)
//! ```
//!
//! ```rust,ignore
//! let db = till_db::Database::new(till_db::DbConfig::new("till.db")).await?;
//! let milk = db.products().get("1001").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod flatfile;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbLocation};

pub use repository::customer::CustomerRepository;
pub use repository::product::ProductRepository;
pub use repository::refund_log::RefundLogRepository;
pub use repository::sale::SaleRepository;
