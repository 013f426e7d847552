//! # Domain Errors
//!
//! `CoreError` is what the checkout, inventory, refund and auth logic reject
//! with; `ValidationError` is the narrower set raised by [`crate::validation`]
//! and converts into it.
//!
//! ```text
//!   ValidationError ──► CoreError ──► ApiError (register) ──► terminal
//!                                        ▲
//!                      DbError (till-db) ┘
//! ```
//!
//! Every rejection listed here leaves the state it was checked against
//! untouched. Callers can show the message and carry on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// No product with this barcode in the inventory.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Insufficient stock to reserve.
    ///
    /// ## User Workflow
    /// ```text
    /// add 1001 5
    ///      │
    ///      ▼
    /// reserve: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { barcode: "1001", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Terminal shows: "Insufficient stock for 1001: available 3, requested 5"
    /// ```
    #[error("Insufficient stock for {barcode}: available {available}, requested {requested}")]
    InsufficientStock {
        barcode: String,
        available: i64,
        requested: i64,
    },

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Cart line index does not exist.
    #[error("Cart has no line {index} (cart has {len} lines)")]
    LineNotFound { index: usize, len: usize },

    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Merging into an existing line would pass the per-line cap.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Completing a sale with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Promo code is not in the catalog.
    #[error("Unknown promo code: {0}")]
    UnknownPromoCode(String),

    /// Payments do not cover the grand total.
    #[error("Insufficient payment: paid {paid}, due {due}")]
    InsufficientPayment { paid: String, due: String },

    /// Zero, negative, or otherwise unusable tender amount.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Loyalty tender without an attached customer.
    #[error("Loyalty payment requires an attached customer")]
    NoCustomerForLoyalty,

    /// Loyalty tender larger than the customer's balance.
    #[error("Insufficient loyalty points: available {available}, requested {requested}")]
    InsufficientLoyaltyPoints { available: String, requested: String },

    /// Transaction has already been fully refunded.
    #[error("Sale {0} has already been refunded")]
    AlreadyRefunded(String),

    /// Partial refund selected no refundable lines.
    #[error("No refundable lines selected for sale {0}")]
    NothingToRefund(String),

    /// No user is logged in.
    #[error("No user is logged in")]
    NotAuthenticated,

    /// Username/password mismatch.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The logged-in user's role lacks a permission.
    #[error("{username} ({role}) is not allowed to {action}")]
    PermissionDenied {
        username: String,
        role: String,
        action: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Rejected input, raised before any state is consulted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Missing, or only whitespace.
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Malformed barcode, phone, amount or role name.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

pub type CoreResult<T> = Result<T, CoreError>;
