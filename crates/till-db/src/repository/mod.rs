//! # Repository Module
//!
//! Database repository implementations for Till POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Register command                                                       │
//! │       │                                                                 │
//! │       │  db.sales().record_completed_sale(&sale)                        │
//! │       ▼                                                                 │
//! │  SaleRepository                                                         │
//! │  ├── record_completed_sale  (sale + lines + payments + stock + points)  │
//! │  ├── get_sale / list_recent                                             │
//! │  └── apply_refund           (sale + lines + stock + refund_log)         │
//! │       │                                                                 │
//! │       │  SQL (one transaction per call)                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products and stock deltas
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers and loyalty points
//! - [`SaleRepository`](sale::SaleRepository) - Completed sales and refunds
//! - [`RefundLogRepository`](refund_log::RefundLogRepository) - Refund history
//!
//! Queries are built at runtime with `sqlx::query`/`query_as` so the crate
//! builds without a live database or prepared query cache.

pub mod customer;
pub mod product;
pub mod refund_log;
pub mod sale;
