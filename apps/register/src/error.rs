//! # API Error Type
//!
//! Unified error type for register commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Till POS                               │
//! │                                                                         │
//! │  Shell line ("add 1001 5")                                              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │  Database Error? ─── DbError::StockUnderflow ──────┐            │  │
//! │  │         │                                          ▼            │  │
//! │  │  Business Error? ─── CoreError::InsufficientStock ─► ApiError   │  │
//! │  │         │                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Shell prints "Error: Insufficient stock for 1001: ..."                 │
//! │  (or {"code":"INSUFFICIENT_STOCK","message":"..."} in JSON mode)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use till_core::{CoreError, ValidationError};
use till_db::DbError;

use crate::config::ConfigError;

/// Error returned from register commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Sale not found: 0b6c..."
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Database operation failed
    DatabaseError,

    /// Business rule rejected the request
    BusinessLogic,

    /// Internal error
    Internal,

    /// Cart operation failed
    CartError,

    /// Insufficient stock
    InsufficientStock,

    /// Payment processing error
    PaymentError,

    /// Nobody is logged in, or the credentials were wrong
    Unauthorized,

    /// The logged-in role lacks the permission
    Forbidden,

    /// The record changed underneath the request (e.g. already refunded)
    Conflict,

    /// Configuration could not be loaded or saved
    ConfigError,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::StockUnderflow {
                barcode,
                delta,
                available,
            } => ApiError::new(
                ErrorCode::InsufficientStock,
                format!(
                    "Insufficient stock for {}: {} on hand, {} requested",
                    barcode, available, -delta
                ),
            ),
            DbError::Conflict(message) => ApiError::new(ErrorCode::Conflict, message),
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Io(e) => ApiError::new(ErrorCode::Internal, format!("I/O error: {}", e)),
            DbError::Import { line, message } => ApiError::new(
                ErrorCode::ValidationError,
                format!("Import failed at line {}: {}", line, message),
            ),
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        let code = match err {
            CoreError::ProductNotFound(_) | CoreError::SaleNotFound(_) => ErrorCode::NotFound,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::LineNotFound { .. }
            | CoreError::CartTooLarge { .. }
            | CoreError::EmptyCart => ErrorCode::CartError,
            CoreError::QuantityTooLarge { .. } | CoreError::Validation(_) => {
                ErrorCode::ValidationError
            }
            CoreError::UnknownPromoCode(_) | CoreError::NothingToRefund(_) => {
                ErrorCode::BusinessLogic
            }
            CoreError::InsufficientPayment { .. }
            | CoreError::InvalidPaymentAmount { .. }
            | CoreError::NoCustomerForLoyalty
            | CoreError::InsufficientLoyaltyPoints { .. } => ErrorCode::PaymentError,
            CoreError::AlreadyRefunded(_) => ErrorCode::Conflict,
            CoreError::NotAuthenticated | CoreError::InvalidCredentials => ErrorCode::Unauthorized,
            CoreError::PermissionDenied { .. } => ErrorCode::Forbidden,
        };
        ApiError::new(code, message)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
