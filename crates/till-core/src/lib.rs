//! # till-core: Pure Business Logic for Till POS
//!
//! Everything the register decides lives here: money arithmetic, stock
//! reservation, promotions, checkout totals, refund planning and role
//! permissions. Nothing in this crate touches a database, a file or a
//! terminal.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/register (terminal shell)                  │   │
//! │  │    login ──► add ──► promo ──► pay ──► complete ──► refund      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ inventory │  │ checkout  │  │  refund   │  │   auth    │  │   │
//! │  │   │ reserve/  │  │ totals,   │  │ full and  │  │  roles,   │  │   │
//! │  │   │ release   │  │ payments  │  │ partial   │  │  perms    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    till-db (Database Layer)                     │   │
//! │  │        SQLite repositories, migrations, flat-file import        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Customer, SaleRecord, Payment, etc.)
//! - [`money`] - Money type with integer arithmetic
//! - [`inventory`] - Barcode-keyed stock map with reserve/release
//! - [`promotion`] - Promo code catalog
//! - [`checkout`] - The in-progress transaction and its totals
//! - [`refund`] - Full and partial refund planning
//! - [`auth`] - Users, roles and permissions
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::money::Money;
//! use till_core::types::TaxRate;
//!
//! let price = Money::from_cents(10_000); // 100.00
//! let tax = price.calculate_tax(TaxRate::from_bps(1000)); // 10%
//! assert_eq!(tax.cents(), 1_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod checkout;
pub mod error;
pub mod inventory;
pub mod money;
pub mod promotion;
pub mod refund;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use auth::{Permission, Role, User, UserDirectory};
pub use checkout::{CartItem, Checkout, CompletedSale, Totals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use inventory::Inventory;
pub use money::{LoyaltyPoints, Money};
pub use promotion::{PromoRule, PromotionCatalog};
pub use refund::{RefundKind, RefundPlan};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line in the cart.
///
/// ## Business Reason
/// Catches typos at the scanner (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest unit price or single tender, in cents (1,000,000,000.00).
///
/// Keeps every cart sum well inside `i64`: 100 lines of 999 units at this
/// price is about 1e16 cents.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Slack allowed when comparing tendered amount to the grand total, in cents.
pub const PAYMENT_EPSILON_CENTS: i64 = 1;

/// Currency units (in cents) that earn one loyalty point.
pub const CENTS_PER_LOYALTY_POINT: i64 = 10_000;
